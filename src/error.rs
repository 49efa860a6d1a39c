use thiserror::Error;

/// Longest title the note form accepts, in characters.
pub const MAX_TITLE_CHARS: usize = 50;

/// Longest plain-text body the note form accepts. Markdown notes are not capped.
pub const MAX_PLAIN_CONTENT_CHARS: usize = 500;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid storage key '{0}': keys may only contain letters, digits, '-' and '_'")]
    InvalidKey(String),

    #[error("Storage quota exceeded writing '{key}': {needed} bytes needed, quota is {quota}")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// A rejected note edit. Returned before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Title must not be empty")]
    EmptyTitle,

    #[error("Content must not be empty")]
    EmptyContent,

    #[error("Title is {len} characters long, the limit is {max}")]
    TitleTooLong { len: usize, max: usize },

    #[error("Content is {len} characters long, the limit for plain text is {max}")]
    ContentTooLong { len: usize, max: usize },
}
