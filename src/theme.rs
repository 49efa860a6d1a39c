use serde::{Deserialize, Serialize};
use std::fmt;

use crate::storage::{Storage, StorageEvent};

pub const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    /// Accepts the bare name or a JSON string holding it.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().trim_matches('"') {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current theme, stored as the bare theme name under [`THEME_KEY`].
pub struct ThemeStore<S: Storage> {
    theme: Theme,
    fallback: Theme,
    storage: S,
}

impl<S: Storage> ThemeStore<S> {
    pub fn new(storage: S, fallback: Theme) -> Self {
        Self {
            theme: fallback,
            fallback,
            storage,
        }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn initialize(&mut self) {
        self.theme = match self.storage.get(THEME_KEY) {
            Ok(Some(raw)) => Theme::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, fallback = %self.fallback, "unknown saved theme");
                self.fallback
            }),
            Ok(None) => self.fallback,
            Err(e) => {
                tracing::error!(error = %e, "failed to read saved theme");
                self.fallback
            }
        };
    }

    pub fn set(&mut self, theme: Theme) {
        self.theme = theme;
        if let Err(e) = self.storage.set(THEME_KEY, theme.as_str()) {
            tracing::error!(error = %e, "failed to persist theme");
        }
    }

    pub fn toggle(&mut self) -> Theme {
        let next = self.theme.toggled();
        self.set(next);
        next
    }

    pub fn apply_storage_event(&mut self, event: &StorageEvent) -> bool {
        if event.key != THEME_KEY {
            return false;
        }
        let next = match event.new_value.as_deref() {
            None => self.fallback,
            Some(raw) => match Theme::parse(raw) {
                Some(theme) => theme,
                None => {
                    tracing::warn!(value = %raw, "ignoring unknown external theme");
                    return false;
                }
            },
        };
        let changed = next != self.theme;
        self.theme = next;
        changed
    }
}
