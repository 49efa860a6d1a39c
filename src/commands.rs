use serde::Serialize;
use std::sync::Arc;
use tauri::{AppHandle, Emitter, Manager, State};

use crate::auth::AuthState;
use crate::guard::{self, RouteDecision};
use crate::logging::{init_logging, LogConfig};
use crate::note::{Note, NoteDraft, NoteId, NoteUpdate, SortBy, SortOrder, TagFilter};
use crate::notes_store::NotesState;
use crate::selectors::{page_of, NoteStats, Page};
use crate::settings::{load_settings, save_settings, settings_path, Settings};
use crate::storage::{FileStorage, StorageWatcher};
use crate::theme::Theme;
use crate::{AppState, SharedStorage};

// Storage change event payload
#[derive(Clone, Serialize)]
struct StorageChangeEvent {
    key: String,
}

// NOTE COMMANDS

#[tauri::command]
fn get_notes_state(state: State<AppState>) -> NotesState {
    state.notes.lock().expect("notes mutex").state().clone()
}

#[tauri::command]
fn list_notes(pages_loaded: Option<usize>, state: State<AppState>) -> Page<Note> {
    let page_size = state.settings.read().expect("settings read lock").page_size;
    let notes = state.notes.lock().expect("notes mutex");
    let filtered: Vec<Note> = notes.filtered_notes().into_iter().cloned().collect();
    page_of(&filtered, page_size, pages_loaded.unwrap_or(1))
}

#[tauri::command]
fn add_note(draft: NoteDraft, state: State<AppState>) -> Result<NoteId, String> {
    let mut notes = state.notes.lock().expect("notes mutex");
    notes.add_note(draft).map_err(|e| e.to_string())
}

#[tauri::command]
fn update_note(id: NoteId, changes: NoteUpdate, state: State<AppState>) -> Result<(), String> {
    let mut notes = state.notes.lock().expect("notes mutex");
    notes.update_note(id, changes).map_err(|e| e.to_string())
}

#[tauri::command]
fn delete_note(id: NoteId, state: State<AppState>) {
    state.notes.lock().expect("notes mutex").delete_note(id);
}

#[tauri::command]
fn toggle_star(id: NoteId, state: State<AppState>) -> Option<bool> {
    let mut notes = state.notes.lock().expect("notes mutex");
    notes.toggle_star(id);
    notes.note_by_id(id).map(|n| n.starred)
}

#[tauri::command]
fn start_edit(id: NoteId, state: State<AppState>) -> Option<Note> {
    let mut notes = state.notes.lock().expect("notes mutex");
    notes.start_edit(id);
    notes.editing_note().cloned()
}

#[tauri::command]
fn cancel_edit(state: State<AppState>) {
    state.notes.lock().expect("notes mutex").cancel_edit();
}

#[tauri::command]
fn set_search_term(term: String, state: State<AppState>) {
    state.notes.lock().expect("notes mutex").set_search_term(term);
}

#[tauri::command]
fn set_selected_tag(tag: TagFilter, state: State<AppState>) {
    state.notes.lock().expect("notes mutex").set_selected_tag(tag);
}

#[tauri::command]
fn set_sort_by(sort_by: SortBy, state: State<AppState>) {
    state.notes.lock().expect("notes mutex").set_sort_by(sort_by);
}

#[tauri::command]
fn set_sort_order(order: SortOrder, state: State<AppState>) {
    state.notes.lock().expect("notes mutex").set_sort_order(order);
}

#[tauri::command]
fn toggle_sort_order(state: State<AppState>) -> SortOrder {
    state.notes.lock().expect("notes mutex").toggle_sort_order()
}

#[tauri::command]
fn set_dragged_note_id(id: Option<NoteId>, state: State<AppState>) {
    state.notes.lock().expect("notes mutex").set_dragged_note_id(id);
}

#[tauri::command]
fn set_drag_over_index(index: Option<usize>, state: State<AppState>) {
    state
        .notes
        .lock()
        .expect("notes mutex")
        .set_drag_over_index(index);
}

#[tauri::command]
fn handle_drop(drop_index: usize, state: State<AppState>) -> Vec<NoteId> {
    let mut notes = state.notes.lock().expect("notes mutex");
    notes.handle_drop(drop_index);
    notes.notes().iter().map(|n| n.id).collect()
}

#[tauri::command]
fn cancel_drag(state: State<AppState>) {
    state.notes.lock().expect("notes mutex").cancel_drag();
}

#[tauri::command]
fn get_all_tags(state: State<AppState>) -> Vec<String> {
    let notes = state.notes.lock().expect("notes mutex");
    notes.all_tags().into_iter().map(str::to_string).collect()
}

#[tauri::command]
fn get_starred_notes(state: State<AppState>) -> Vec<Note> {
    let notes = state.notes.lock().expect("notes mutex");
    notes.starred_notes().into_iter().cloned().collect()
}

#[tauri::command]
fn get_note_by_id(id: NoteId, state: State<AppState>) -> Option<Note> {
    let notes = state.notes.lock().expect("notes mutex");
    notes.note_by_id(id).cloned()
}

#[tauri::command]
fn get_stats(state: State<AppState>) -> NoteStats {
    state.notes.lock().expect("notes mutex").stats()
}

#[tauri::command]
fn generate_test_notes(count: Option<usize>, state: State<AppState>) -> Vec<NoteId> {
    let count = count.unwrap_or_else(|| {
        state
            .settings
            .read()
            .expect("settings read lock")
            .test_note_count
    });
    state
        .notes
        .lock()
        .expect("notes mutex")
        .generate_test_notes(count)
}

#[tauri::command]
fn delete_all_notes(state: State<AppState>) {
    state.notes.lock().expect("notes mutex").delete_all_notes();
}

#[tauri::command]
fn reset_notes(state: State<AppState>) {
    state.notes.lock().expect("notes mutex").reset();
}

// AUTH COMMANDS

#[tauri::command]
fn login(username: String, password: String, state: State<AppState>) -> bool {
    state
        .auth
        .lock()
        .expect("auth mutex")
        .login(&username, &password)
}

#[tauri::command]
fn logout(state: State<AppState>) {
    state.auth.lock().expect("auth mutex").logout();
}

#[tauri::command]
fn get_auth(state: State<AppState>) -> AuthState {
    state.auth.lock().expect("auth mutex").state().clone()
}

#[tauri::command]
fn check_route(path: String, state: State<AppState>) -> RouteDecision {
    let authenticated = state.auth.lock().expect("auth mutex").is_authenticated();
    guard::authorize(authenticated, &path)
}

#[tauri::command]
fn return_path(from: Option<String>) -> String {
    guard::return_path(from.as_deref())
}

// THEME COMMANDS

#[tauri::command]
fn get_theme(state: State<AppState>) -> Theme {
    state.theme.lock().expect("theme mutex").theme()
}

#[tauri::command]
fn set_theme(theme: Theme, state: State<AppState>) {
    state.theme.lock().expect("theme mutex").set(theme);
}

#[tauri::command]
fn toggle_theme(state: State<AppState>) -> Theme {
    state.theme.lock().expect("theme mutex").toggle()
}

// SETTINGS COMMANDS

#[tauri::command]
fn get_settings(state: State<AppState>) -> Settings {
    state.settings.read().expect("settings read lock").clone()
}

#[tauri::command]
fn update_settings(
    app: AppHandle,
    new_settings: Settings,
    state: State<AppState>,
) -> Result<(), String> {
    let config_dir = app.path().app_config_dir().map_err(|e| e.to_string())?;
    save_settings(&settings_path(&config_dir), &new_settings).map_err(|e| e.to_string())?;

    let mut settings = state.settings.write().expect("settings write lock");
    *settings = new_settings;
    Ok(())
}

// Fold changes written by other windows or processes into state and tell the view.
fn spawn_storage_sync(app: AppHandle, mut watcher: StorageWatcher) {
    tauri::async_runtime::spawn(async move {
        while let Some(event) = watcher.next().await {
            let changed = app.state::<AppState>().apply_storage_event(&event);
            if changed {
                let _ = app.emit("storage-change", StorageChangeEvent { key: event.key });
            }
        }
    });
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .setup(|app| {
            let config_dir = app.path().app_config_dir()?;
            let settings = load_settings(&settings_path(&config_dir));

            if let Err(e) = init_logging(&LogConfig::new(settings.log_level.clone())) {
                eprintln!("{}", e);
            }

            let data_dir = settings.storage_dir(&app.path().app_data_dir()?);
            let file_storage =
                FileStorage::open(&data_dir)?.with_quota(settings.storage_quota_bytes);
            let watcher = file_storage.watch();

            let storage: SharedStorage = Arc::new(file_storage);
            let state = AppState::new(storage, settings);
            state.initialize();
            app.manage(state);

            match watcher {
                Ok(watcher) => spawn_storage_sync(app.handle().clone(), watcher),
                Err(e) => tracing::warn!(error = %e, "external storage changes will not be picked up"),
            }

            tracing::info!(dir = %data_dir.display(), "notekeeper started");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            get_notes_state,
            list_notes,
            add_note,
            update_note,
            delete_note,
            toggle_star,
            start_edit,
            cancel_edit,
            set_search_term,
            set_selected_tag,
            set_sort_by,
            set_sort_order,
            toggle_sort_order,
            set_dragged_note_id,
            set_drag_over_index,
            handle_drop,
            cancel_drag,
            get_all_tags,
            get_starred_notes,
            get_note_by_id,
            get_stats,
            generate_test_notes,
            delete_all_notes,
            reset_notes,
            login,
            logout,
            get_auth,
            check_route,
            return_path,
            get_theme,
            set_theme,
            toggle_theme,
            get_settings,
            update_settings,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
