use chrono::{DateTime, Duration, Local};
use serde::Serialize;
use std::collections::HashSet;

use crate::error::ValidationError;
use crate::note::{
    format_timestamp, Note, NoteDraft, NoteId, NoteUpdate, SortBy, SortOrder, TagFilter,
};
use crate::selectors::{self, NoteStats};
use crate::storage::{read_json, remove_key, write_json, Storage, StorageEvent};

pub const NOTES_KEY: &str = "notes";

/// Everything the note views read: the collection plus filter, edit and drag state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesState {
    pub notes: Vec<Note>,
    pub search_term: String,
    pub selected_tag: TagFilter,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub editing_note_id: Option<NoteId>,
    pub dragged_note_id: Option<NoteId>,
    pub drag_over_index: Option<usize>,
}

impl NotesState {
    pub fn with_sort(sort_by: SortBy) -> Self {
        Self {
            sort_by,
            ..Default::default()
        }
    }

    pub fn position(&self, id: NoteId) -> Option<usize> {
        self.notes.iter().position(|n| n.id == id)
    }

    fn clear_dangling_pointers(&mut self) {
        if let Some(id) = self.editing_note_id {
            if self.position(id).is_none() {
                self.editing_note_id = None;
            }
        }
        if let Some(id) = self.dragged_note_id {
            if self.position(id).is_none() {
                self.dragged_note_id = None;
                self.drag_over_index = None;
            }
        }
    }
}

/// Every state transition the note store knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteAction {
    AddNote {
        id: NoteId,
        created_at: String,
        draft: NoteDraft,
    },
    DeleteNote(NoteId),
    UpdateNote {
        id: NoteId,
        updated_at: String,
        changes: NoteUpdate,
    },
    ToggleStar(NoteId),
    StartEdit(NoteId),
    CancelEdit,
    SetSearchTerm(String),
    SetSelectedTag(TagFilter),
    SetSortBy(SortBy),
    SetSortOrder(SortOrder),
    ToggleSortOrder,
    SetDraggedNoteId(Option<NoteId>),
    SetDragOverIndex(Option<usize>),
    Drop(usize),
    CancelDrag,
    AppendNotes(Vec<Note>),
    /// Replace the collection wholesale (initial load, external change).
    ReplaceNotes(Vec<Note>),
    DeleteAllNotes,
    Reset,
}

/// What the store must mirror to storage after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persist {
    Nothing,
    Notes,
    Clear,
}

/// Apply one action. On `Err` the state has not been modified.
pub fn reduce(state: &mut NotesState, action: NoteAction) -> Result<Persist, ValidationError> {
    let persist = match action {
        NoteAction::AddNote {
            id,
            created_at,
            draft,
        } => {
            draft.validate()?;
            state.notes.push(draft.into_note(id, created_at));
            state.editing_note_id = None;
            Persist::Notes
        }

        NoteAction::DeleteNote(id) => {
            let before = state.notes.len();
            state.notes.retain(|n| n.id != id);
            if state.notes.len() == before {
                Persist::Nothing
            } else {
                state.clear_dangling_pointers();
                Persist::Notes
            }
        }

        NoteAction::UpdateNote {
            id,
            updated_at,
            changes,
        } => {
            changes.validate()?;
            match state.notes.iter_mut().find(|n| n.id == id) {
                Some(note) => {
                    changes.validate_for(note)?;
                    changes.apply(note, updated_at);
                    state.editing_note_id = None;
                    Persist::Notes
                }
                None => Persist::Nothing,
            }
        }

        NoteAction::ToggleStar(id) => match state.notes.iter_mut().find(|n| n.id == id) {
            Some(note) => {
                note.starred = !note.starred;
                Persist::Notes
            }
            None => Persist::Nothing,
        },

        NoteAction::StartEdit(id) => {
            if state.position(id).is_some() {
                state.editing_note_id = Some(id);
            }
            Persist::Nothing
        }

        NoteAction::CancelEdit => {
            state.editing_note_id = None;
            Persist::Nothing
        }

        NoteAction::SetSearchTerm(term) => {
            state.search_term = term;
            Persist::Nothing
        }

        NoteAction::SetSelectedTag(tag) => {
            state.selected_tag = tag;
            Persist::Nothing
        }

        NoteAction::SetSortBy(sort_by) => {
            state.sort_by = sort_by;
            Persist::Nothing
        }

        NoteAction::SetSortOrder(order) => {
            state.sort_order = order;
            Persist::Nothing
        }

        NoteAction::ToggleSortOrder => {
            state.sort_order = state.sort_order.toggled();
            Persist::Nothing
        }

        NoteAction::SetDraggedNoteId(id) => {
            state.dragged_note_id = id;
            Persist::Nothing
        }

        NoteAction::SetDragOverIndex(index) => {
            state.drag_over_index = index;
            Persist::Nothing
        }

        NoteAction::Drop(drop_index) => {
            let Some(from) = state.dragged_note_id.and_then(|id| state.position(id)) else {
                return Ok(Persist::Nothing);
            };
            let note = state.notes.remove(from);
            let to = drop_index.min(state.notes.len());
            state.notes.insert(to, note);
            state.dragged_note_id = None;
            state.drag_over_index = None;
            state.sort_by = SortBy::Custom;
            Persist::Notes
        }

        NoteAction::CancelDrag => {
            state.dragged_note_id = None;
            state.drag_over_index = None;
            Persist::Nothing
        }

        NoteAction::AppendNotes(notes) => {
            if notes.is_empty() {
                Persist::Nothing
            } else {
                state.notes.extend(notes);
                repair_duplicate_ids(&mut state.notes);
                Persist::Notes
            }
        }

        NoteAction::ReplaceNotes(mut notes) => {
            let repaired = repair_duplicate_ids(&mut notes);
            state.notes = notes;
            state.clear_dangling_pointers();
            // Write the repaired ids back so every reader agrees on them
            if repaired > 0 {
                Persist::Notes
            } else {
                Persist::Nothing
            }
        }

        NoteAction::DeleteAllNotes => {
            state.notes.clear();
            state.editing_note_id = None;
            state.dragged_note_id = None;
            state.drag_over_index = None;
            state.search_term.clear();
            state.selected_tag = TagFilter::All;
            Persist::Clear
        }

        NoteAction::Reset => {
            *state = NotesState::default();
            Persist::Clear
        }
    };
    Ok(persist)
}

/// `count` ids unused by `notes`. Starts at `now_millis`, or one past the
/// largest existing id when that is not older.
pub fn allocate_ids(notes: &[Note], now_millis: NoteId, count: usize) -> Vec<NoteId> {
    let mut taken: HashSet<NoteId> = notes.iter().map(|n| n.id).collect();
    let start = match taken.iter().max() {
        Some(&max) if max >= now_millis => max.checked_add(1),
        _ => Some(now_millis),
    };
    fresh_ids(&mut taken, start, count)
}

// Counts up from `start`. Once that runs past `NoteId::MAX`, takes the
// smallest unused id instead.
fn fresh_ids(taken: &mut HashSet<NoteId>, start: Option<NoteId>, count: usize) -> Vec<NoteId> {
    let mut next = start;
    let mut ids = Vec::with_capacity(count);
    while ids.len() < count {
        let id = match next.filter(|id| !taken.contains(id)) {
            Some(id) => id,
            None => smallest_unused(taken),
        };
        taken.insert(id);
        ids.push(id);
        next = id.checked_add(1);
    }
    ids
}

fn smallest_unused(taken: &HashSet<NoteId>) -> NoteId {
    (0..=NoteId::MAX).find(|id| !taken.contains(id)).unwrap_or(0)
}

/// Give every repeated id a fresh one. The first note holding an id keeps it.
/// Returns how many notes were renumbered.
pub fn repair_duplicate_ids(notes: &mut [Note]) -> usize {
    let mut seen = HashSet::with_capacity(notes.len());
    let duplicates: Vec<usize> = notes
        .iter()
        .enumerate()
        .filter(|(_, n)| !seen.insert(n.id))
        .map(|(index, _)| index)
        .collect();
    if duplicates.is_empty() {
        return 0;
    }

    let start = seen.iter().max().and_then(|max| max.checked_add(1));
    let fresh = fresh_ids(&mut seen, start, duplicates.len());
    for (&index, id) in duplicates.iter().zip(fresh) {
        tracing::warn!(old = notes[index].id, new = id, "renumbered note with duplicate id");
        notes[index].id = id;
    }
    duplicates.len()
}

/// Sample notes for filling an empty notebook, one per id, one hour apart
/// going back from `now`.
pub fn sample_notes(ids: &[NoteId], now: DateTime<Local>) -> Vec<Note> {
    let stamp = format_timestamp(&now);
    ids.iter()
        .enumerate()
        .map(|(i, &id)| Note {
            id,
            title: format!("Test note {}", i + 1),
            content: format!("This is the content of test note {}", i + 1),
            tags: vec!["test".to_string(), format!("tag{}", i % 3 + 1)],
            starred: i % 3 == 0,
            is_markdown: false,
            created_at: format_timestamp(&(now - Duration::hours(i as i64))),
            updated_at: Some(stamp.clone()),
        })
        .collect()
}

/// Note state plus the storage it is mirrored to.
///
/// Every transition that changes the collection writes the whole collection
/// under [`NOTES_KEY`] before returning. Write failures are logged and the
/// in-memory state is kept.
pub struct NoteStore<S: Storage> {
    state: NotesState,
    storage: S,
}

impl<S: Storage> NoteStore<S> {
    pub fn new(storage: S) -> Self {
        Self::with_sort(storage, SortBy::default())
    }

    pub fn with_sort(storage: S, sort_by: SortBy) -> Self {
        Self {
            state: NotesState::with_sort(sort_by),
            storage,
        }
    }

    pub fn state(&self) -> &NotesState {
        &self.state
    }

    pub fn notes(&self) -> &[Note] {
        &self.state.notes
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Load persisted notes. Never fails: unreadable data leaves an empty collection.
    pub fn initialize(&mut self) {
        let notes = match read_json::<Vec<Note>, _>(&self.storage, NOTES_KEY) {
            Ok(Some(notes)) => {
                tracing::info!(count = notes.len(), "loaded notes");
                notes
            }
            Ok(None) => {
                tracing::info!("no saved notes");
                Vec::new()
            }
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "failed to load notes");
                Vec::new()
            }
        };
        self.apply(NoteAction::ReplaceNotes(notes));
    }

    /// Run one action and mirror the result to storage.
    pub fn dispatch(&mut self, action: NoteAction) -> Result<(), ValidationError> {
        match reduce(&mut self.state, action)? {
            Persist::Nothing => {}
            Persist::Notes => {
                write_json(&self.storage, NOTES_KEY, &self.state.notes);
            }
            Persist::Clear => {
                remove_key(&self.storage, NOTES_KEY);
            }
        }
        Ok(())
    }

    // For actions that cannot fail validation.
    fn apply(&mut self, action: NoteAction) {
        if let Err(e) = self.dispatch(action) {
            tracing::warn!(error = %e, "unexpected validation failure");
        }
    }

    fn next_ids(&self, now: &DateTime<Local>, count: usize) -> Vec<NoteId> {
        allocate_ids(&self.state.notes, now.timestamp_millis(), count)
    }

    // ---- Mutations ----

    pub fn add_note(&mut self, draft: NoteDraft) -> Result<NoteId, ValidationError> {
        let now = Local::now();
        let id = self.next_ids(&now, 1).first().copied().unwrap_or_default();
        self.dispatch(NoteAction::AddNote {
            id,
            created_at: format_timestamp(&now),
            draft,
        })?;
        tracing::debug!(id, "note added");
        Ok(id)
    }

    pub fn delete_note(&mut self, id: NoteId) {
        self.apply(NoteAction::DeleteNote(id));
    }

    pub fn update_note(&mut self, id: NoteId, changes: NoteUpdate) -> Result<(), ValidationError> {
        self.dispatch(NoteAction::UpdateNote {
            id,
            updated_at: format_timestamp(&Local::now()),
            changes,
        })
    }

    pub fn toggle_star(&mut self, id: NoteId) {
        self.apply(NoteAction::ToggleStar(id));
    }

    pub fn start_edit(&mut self, id: NoteId) {
        self.apply(NoteAction::StartEdit(id));
    }

    pub fn cancel_edit(&mut self) {
        self.apply(NoteAction::CancelEdit);
    }

    /// The note currently being edited, resolved from the edit pointer.
    pub fn editing_note(&self) -> Option<&Note> {
        self.state.editing_note_id.and_then(|id| self.note_by_id(id))
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.apply(NoteAction::SetSearchTerm(term.into()));
    }

    pub fn set_selected_tag(&mut self, tag: TagFilter) {
        self.apply(NoteAction::SetSelectedTag(tag));
    }

    pub fn set_sort_by(&mut self, sort_by: SortBy) {
        self.apply(NoteAction::SetSortBy(sort_by));
    }

    pub fn set_sort_order(&mut self, order: SortOrder) {
        self.apply(NoteAction::SetSortOrder(order));
    }

    /// Flip the direction of the title and updated sorts, returning the new one.
    pub fn toggle_sort_order(&mut self) -> SortOrder {
        self.apply(NoteAction::ToggleSortOrder);
        self.state.sort_order
    }

    pub fn set_dragged_note_id(&mut self, id: Option<NoteId>) {
        self.apply(NoteAction::SetDraggedNoteId(id));
    }

    pub fn set_drag_over_index(&mut self, index: Option<usize>) {
        self.apply(NoteAction::SetDragOverIndex(index));
    }

    pub fn handle_drop(&mut self, drop_index: usize) {
        self.apply(NoteAction::Drop(drop_index));
    }

    pub fn cancel_drag(&mut self) {
        self.apply(NoteAction::CancelDrag);
    }

    pub fn generate_test_notes(&mut self, count: usize) -> Vec<NoteId> {
        let now = Local::now();
        let ids = self.next_ids(&now, count);
        self.apply(NoteAction::AppendNotes(sample_notes(&ids, now)));
        ids
    }

    pub fn delete_all_notes(&mut self) {
        self.apply(NoteAction::DeleteAllNotes);
    }

    pub fn reset(&mut self) {
        self.apply(NoteAction::Reset);
    }

    /// Fold a change made by another process into state. Last writer wins.
    /// Returns whether state changed.
    pub fn apply_storage_event(&mut self, event: &StorageEvent) -> bool {
        if event.key != NOTES_KEY {
            return false;
        }
        let notes = match event.new_value.as_deref() {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<Vec<Note>>(raw) {
                Ok(notes) => notes,
                Err(e) => {
                    tracing::error!(error = %e, "ignoring unreadable external notes change");
                    return false;
                }
            },
        };
        if notes == self.state.notes {
            return false;
        }
        tracing::info!(count = notes.len(), "notes changed in another window");
        self.apply(NoteAction::ReplaceNotes(notes));
        true
    }

    // ---- Selectors ----

    pub fn filtered_notes(&self) -> Vec<&Note> {
        selectors::filtered_notes(&self.state)
    }

    pub fn all_tags(&self) -> Vec<&str> {
        selectors::all_tags(&self.state.notes)
    }

    pub fn starred_notes(&self) -> Vec<&Note> {
        selectors::starred_notes(&self.state.notes)
    }

    pub fn note_by_id(&self, id: NoteId) -> Option<&Note> {
        selectors::note_by_id(&self.state.notes, id)
    }

    pub fn stats(&self) -> NoteStats {
        selectors::note_stats(&self.state.notes)
    }
}
