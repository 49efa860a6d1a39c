use serde::Serialize;

pub const LOGIN_PATH: &str = "/login";
pub const HOME_PATH: &str = "/";

/// Outcome of checking a protected route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RouteDecision {
    Render,
    /// Send the visitor to `to`, remembering where they were headed.
    Redirect { to: String, from: String },
}

pub fn authorize(is_authenticated: bool, requested_path: &str) -> RouteDecision {
    if is_authenticated {
        RouteDecision::Render
    } else {
        RouteDecision::Redirect {
            to: LOGIN_PATH.to_string(),
            from: requested_path.to_string(),
        }
    }
}

/// Where to go once login succeeds. Only in-app paths are honoured.
pub fn return_path(from: Option<&str>) -> String {
    match from.map(str::trim) {
        Some(path) if is_in_app(path) && path != LOGIN_PATH => path.to_string(),
        _ => HOME_PATH.to_string(),
    }
}

// `//host` and `/\host` are protocol-relative and leave the app.
fn is_in_app(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize() {
        assert_eq!(authorize(true, "/profile"), RouteDecision::Render);
        assert_eq!(
            authorize(false, "/profile"),
            RouteDecision::Redirect {
                to: "/login".to_string(),
                from: "/profile".to_string()
            }
        );
    }

    #[test]
    fn test_return_path() {
        assert_eq!(return_path(Some("/profile")), "/profile");
        assert_eq!(return_path(None), "/");
        assert_eq!(return_path(Some("/login")), "/");
        assert_eq!(return_path(Some("https://elsewhere.example")), "/");
    }

    #[test]
    fn test_return_path_stays_in_app() {
        assert_eq!(return_path(Some("//evil.example")), "/");
        assert_eq!(return_path(Some("  //evil.example/path")), "/");
        assert_eq!(return_path(Some("/\\evil.example")), "/");
        assert_eq!(return_path(Some("/notes//2")), "/notes//2");
    }

    #[test]
    fn test_decision_serializes_for_the_view() {
        let json = serde_json::to_value(authorize(false, "/profile")).unwrap();
        assert_eq!(json["kind"], "redirect");
        assert_eq!(json["from"], "/profile");
    }
}
