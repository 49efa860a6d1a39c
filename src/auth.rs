use serde::{Deserialize, Serialize};

use crate::storage::{read_json, remove_key, write_json, Storage, StorageEvent};

pub const AUTH_KEY: &str = "auth";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AuthUser {
    fn for_username(username: &str) -> Self {
        Self {
            username: username.to_string(),
            email: Some(format!("{}@example.com", username)),
        }
    }
}

/// Persisted form of the auth state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub is_authenticated: bool,
    pub user: Option<AuthUser>,
}

impl AuthState {
    // A record that claims a session but carries no user is not trusted.
    fn sanitized(self) -> Self {
        if self.is_authenticated && self.user.is_some() {
            self
        } else {
            Self::default()
        }
    }
}

/// Mock login gate. Any non-empty username and password pair is accepted;
/// there is no credential check behind it.
pub struct AuthStore<S: Storage> {
    state: AuthState,
    storage: S,
}

impl<S: Storage> AuthStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            state: AuthState::default(),
            storage,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.state.user.as_ref()
    }

    pub fn initialize(&mut self) {
        self.state = match read_json::<AuthState, _>(&self.storage, AUTH_KEY) {
            Ok(Some(saved)) => saved.sanitized(),
            Ok(None) => AuthState::default(),
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "failed to load auth state");
                AuthState::default()
            }
        };
        if let Some(user) = &self.state.user {
            tracing::info!(username = %user.username, "restored session");
        }
    }

    pub fn login(&mut self, username: &str, password: &str) -> bool {
        if username.is_empty() || password.is_empty() {
            tracing::debug!("login rejected: empty username or password");
            return false;
        }

        self.state = AuthState {
            is_authenticated: true,
            user: Some(AuthUser::for_username(username)),
        };
        write_json(&self.storage, AUTH_KEY, &self.state);
        tracing::info!(username, "logged in");
        true
    }

    pub fn logout(&mut self) {
        if let Some(user) = &self.state.user {
            tracing::info!(username = %user.username, "logged out");
        }
        self.state = AuthState::default();
        remove_key(&self.storage, AUTH_KEY);
    }

    /// Fold a login or logout from another process into state.
    pub fn apply_storage_event(&mut self, event: &StorageEvent) -> bool {
        if event.key != AUTH_KEY {
            return false;
        }
        let next = match event.new_value.as_deref() {
            None => AuthState::default(),
            Some(raw) => match serde_json::from_str::<AuthState>(raw) {
                Ok(saved) => saved.sanitized(),
                Err(e) => {
                    tracing::error!(error = %e, "ignoring unreadable external auth change");
                    return false;
                }
            },
        };
        if next == self.state {
            return false;
        }
        self.state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    fn store() -> (AuthStore<Arc<MemoryStorage>>, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (AuthStore::new(Arc::clone(&storage)), storage)
    }

    #[test]
    fn test_login_logout() {
        let (mut auth, storage) = store();
        assert!(!auth.is_authenticated());

        assert!(auth.login("alice", "pw"));
        assert!(auth.is_authenticated());
        let user = auth.user().unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.email.as_deref(), Some("alice@example.com"));

        let saved: serde_json::Value =
            serde_json::from_str(&storage.get(AUTH_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(saved["isAuthenticated"], true);
        assert_eq!(saved["user"]["username"], "alice");

        auth.logout();
        assert!(!auth.is_authenticated());
        assert!(auth.user().is_none());
        assert_eq!(storage.get(AUTH_KEY).unwrap(), None);
    }

    #[test]
    fn test_login_requires_both_fields() {
        let (mut auth, storage) = store();
        assert!(!auth.login("", "pw"));
        assert!(!auth.login("alice", ""));
        assert!(!auth.is_authenticated());
        assert_eq!(storage.get(AUTH_KEY).unwrap(), None);
    }

    #[test]
    fn test_initialize_restores_session() {
        let storage = Arc::new(MemoryStorage::new());
        AuthStore::new(Arc::clone(&storage)).login("bob", "secret");

        let mut auth = AuthStore::new(Arc::clone(&storage));
        assert!(!auth.is_authenticated());
        auth.initialize();
        assert!(auth.is_authenticated());
        assert_eq!(auth.user().unwrap().username, "bob");
    }

    #[test]
    fn test_initialize_handles_bad_records() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(AUTH_KEY, "not json").unwrap();
        let mut auth = AuthStore::new(Arc::clone(&storage));
        auth.initialize();
        assert!(!auth.is_authenticated());

        storage
            .set(AUTH_KEY, r#"{"isAuthenticated":true,"user":null}"#)
            .unwrap();
        auth.initialize();
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn test_login_survives_storage_failure() {
        let storage = Arc::new(MemoryStorage::with_quota(5));
        let mut auth = AuthStore::new(Arc::clone(&storage));
        assert!(auth.login("alice", "pw"));
        assert!(auth.is_authenticated());
        assert_eq!(storage.get(AUTH_KEY).unwrap(), None);
    }

    #[test]
    fn test_apply_storage_event() {
        let (mut auth, _) = store();
        auth.login("alice", "pw");

        let logout = StorageEvent {
            key: AUTH_KEY.to_string(),
            new_value: None,
        };
        assert!(auth.apply_storage_event(&logout));
        assert!(!auth.is_authenticated());
        assert!(!auth.apply_storage_event(&logout));

        let login = StorageEvent {
            key: AUTH_KEY.to_string(),
            new_value: Some(r#"{"isAuthenticated":true,"user":{"username":"carol"}}"#.to_string()),
        };
        assert!(auth.apply_storage_event(&login));
        assert_eq!(auth.user().unwrap().username, "carol");
        assert_eq!(auth.user().unwrap().email, None);
    }
}
