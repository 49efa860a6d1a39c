use std::sync::{Arc, Mutex, RwLock};

pub mod auth;
pub mod error;
pub mod guard;
pub mod logging;
pub mod note;
pub mod notes_store;
pub mod selectors;
pub mod settings;
pub mod storage;
pub mod theme;

#[cfg(feature = "desktop")]
mod commands;

#[cfg(feature = "desktop")]
pub use commands::run;

pub use auth::{AuthStore, AuthUser};
pub use error::{StorageError, ValidationError};
pub use note::{Note, NoteDraft, NoteId, NoteUpdate, SortBy, SortOrder, TagFilter};
pub use notes_store::{NoteAction, NoteStore, NotesState};
pub use settings::Settings;
pub use storage::{FileStorage, MemoryStorage, Storage, StorageEvent};
pub use theme::{Theme, ThemeStore};

/// One storage backend shared by every store.
pub type SharedStorage = Arc<dyn Storage>;

// App state: one instance per window, shared with every command
pub struct AppState {
    pub settings: RwLock<Settings>,
    pub notes: Mutex<NoteStore<SharedStorage>>,
    pub auth: Mutex<AuthStore<SharedStorage>>,
    pub theme: Mutex<ThemeStore<SharedStorage>>,
}

impl AppState {
    pub fn new(storage: SharedStorage, settings: Settings) -> Self {
        Self {
            notes: Mutex::new(NoteStore::with_sort(
                Arc::clone(&storage),
                settings.default_sort,
            )),
            auth: Mutex::new(AuthStore::new(Arc::clone(&storage))),
            theme: Mutex::new(ThemeStore::new(storage, settings.default_theme)),
            settings: RwLock::new(settings),
        }
    }

    /// Load every store from storage.
    pub fn initialize(&self) {
        self.notes.lock().expect("notes mutex").initialize();
        self.auth.lock().expect("auth mutex").initialize();
        self.theme.lock().expect("theme mutex").initialize();
    }

    /// Route an external storage change to the store that owns the key.
    pub fn apply_storage_event(&self, event: &StorageEvent) -> bool {
        match event.key.as_str() {
            notes_store::NOTES_KEY => self
                .notes
                .lock()
                .expect("notes mutex")
                .apply_storage_event(event),
            auth::AUTH_KEY => self
                .auth
                .lock()
                .expect("auth mutex")
                .apply_storage_event(event),
            theme::THEME_KEY => self
                .theme
                .lock()
                .expect("theme mutex")
                .apply_storage_event(event),
            other => {
                tracing::debug!(key = other, "ignoring change to unknown storage key");
                false
            }
        }
    }
}
