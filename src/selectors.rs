//! Pure read-only views over note state.

use serde::Serialize;
use std::cmp::Reverse;

use crate::note::{Note, NoteId, SortBy, SortOrder, TagFilter};
use crate::notes_store::NotesState;

/// Counts shown on the profile page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteStats {
    pub total: usize,
    pub starred: usize,
    pub tags: Vec<String>,
}

/// One infinite-scroll window over a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

/// Search, then tag filter, then a stable sort.
pub fn filtered_notes(state: &NotesState) -> Vec<&Note> {
    let needle = state.search_term.to_lowercase();

    let mut notes: Vec<&Note> = state
        .notes
        .iter()
        .filter(|note| needle.is_empty() || note.matches(&needle))
        .filter(|note| match &state.selected_tag {
            TagFilter::All => true,
            TagFilter::Tag(tag) => note.has_tag(tag),
        })
        .collect();

    // Keys are computed once per note. The sort is stable, so equal keys
    // keep collection order.
    let descending = state.sort_order == SortOrder::Desc;
    match state.sort_by {
        SortBy::Newest => notes.sort_by_cached_key(|n| Reverse(n.created())),
        SortBy::Oldest => notes.sort_by_cached_key(|n| n.created()),
        SortBy::Title if descending => notes.sort_by_cached_key(|n| Reverse(n.title.to_lowercase())),
        SortBy::Title => notes.sort_by_cached_key(|n| n.title.to_lowercase()),
        SortBy::Updated if descending => notes.sort_by_cached_key(|n| Reverse(n.last_touched())),
        SortBy::Updated => notes.sort_by_cached_key(|n| n.last_touched()),
        SortBy::Custom => {}
    }
    notes
}

/// Every tag in use, first-seen order, no duplicates.
pub fn all_tags(notes: &[Note]) -> Vec<&str> {
    let mut tags: Vec<&str> = Vec::new();
    for tag in notes.iter().flat_map(|n| n.tags.iter()) {
        if !tags.contains(&tag.as_str()) {
            tags.push(tag);
        }
    }
    tags
}

pub fn starred_notes(notes: &[Note]) -> Vec<&Note> {
    notes.iter().filter(|n| n.starred).collect()
}

pub fn note_by_id(notes: &[Note], id: NoteId) -> Option<&Note> {
    notes.iter().find(|n| n.id == id)
}

pub fn note_stats(notes: &[Note]) -> NoteStats {
    NoteStats {
        total: notes.len(),
        starred: notes.iter().filter(|n| n.starred).count(),
        tags: all_tags(notes).into_iter().map(str::to_string).collect(),
    }
}

/// The first `page_size * pages_loaded` items and whether more remain.
pub fn page_of<T: Clone>(items: &[T], page_size: usize, pages_loaded: usize) -> Page<T> {
    let shown = page_size.saturating_mul(pages_loaded).min(items.len());
    Page {
        items: items[..shown].to_vec(),
        has_more: shown < items.len(),
    }
}
