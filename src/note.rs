use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ValidationError, MAX_PLAIN_CONTENT_CHARS, MAX_TITLE_CHARS};

/// Milliseconds since the Unix epoch at creation time.
pub type NoteId = i64;

const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

// Formats seen in persisted data, tried in order when sorting.
const ACCEPTED_FORMATS: &[&str] = &["%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    // Older records used `isStarred` for the same flag
    #[serde(default, alias = "isStarred")]
    pub starred: bool,
    #[serde(default)]
    pub is_markdown: bool,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Note {
    pub fn created(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.created_at)
    }

    /// Last update, or creation time for notes never edited.
    pub fn last_touched(&self) -> Option<NaiveDateTime> {
        self.updated_at
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| self.created())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Case-insensitive substring match over title and content.
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle) || self.content.to_lowercase().contains(needle)
    }
}

/// Fields supplied by the note form when creating a note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_markdown: bool,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn markdown(mut self, is_markdown: bool) -> Self {
        self.is_markdown = is_markdown;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)?;
        validate_content(&self.content)?;
        check_content_length(&self.content, self.is_markdown)
    }

    pub(crate) fn into_note(self, id: NoteId, created_at: String) -> Note {
        Note {
            id,
            title: self.title,
            content: self.content,
            tags: normalize_tags(self.tags),
            starred: false,
            is_markdown: self.is_markdown,
            created_at,
            updated_at: None,
        }
    }
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_markdown: Option<bool>,
}

impl NoteUpdate {
    /// Field checks that do not depend on the note being updated.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(content) = &self.content {
            validate_content(content)?;
        }
        Ok(())
    }

    /// Checks against the note the changes will land on.
    pub fn validate_for(&self, note: &Note) -> Result<(), ValidationError> {
        self.validate()?;
        let is_markdown = self.is_markdown.unwrap_or(note.is_markdown);
        let content = self.content.as_deref().unwrap_or(&note.content);
        check_content_length(content, is_markdown)
    }

    pub(crate) fn apply(self, note: &mut Note, updated_at: String) {
        if let Some(title) = self.title {
            note.title = title;
        }
        if let Some(content) = self.content {
            note.content = content;
        }
        if let Some(tags) = self.tags {
            note.tags = normalize_tags(tags);
        }
        if let Some(starred) = self.starred {
            note.starred = starred;
        }
        if let Some(is_markdown) = self.is_markdown {
            note.is_markdown = is_markdown;
        }
        note.updated_at = Some(updated_at);
    }
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    let len = title.chars().count();
    if len > MAX_TITLE_CHARS {
        return Err(ValidationError::TitleTooLong {
            len,
            max: MAX_TITLE_CHARS,
        });
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        Err(ValidationError::EmptyContent)
    } else {
        Ok(())
    }
}

fn check_content_length(content: &str, is_markdown: bool) -> Result<(), ValidationError> {
    if is_markdown {
        return Ok(());
    }
    let len = content.chars().count();
    if len > MAX_PLAIN_CONTENT_CHARS {
        return Err(ValidationError::ContentTooLong {
            len,
            max: MAX_PLAIN_CONTENT_CHARS,
        });
    }
    Ok(())
}

/// Trim, drop empties, and dedupe keeping the first occurrence.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let trimmed = tag.trim();
        if !trimmed.is_empty() && !out.iter().any(|t| t == trimmed) {
            out.push(trimmed.to_string());
        }
    }
    out
}

// ---- Sorting and filtering options ----

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Newest,
    Oldest,
    Title,
    Updated,
    /// Manual drag-and-drop order.
    Custom,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Newest => "newest",
            SortBy::Oldest => "oldest",
            SortBy::Title => "title",
            SortBy::Updated => "updated",
            SortBy::Custom => "custom",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.trim() {
            "newest" => Ok(SortBy::Newest),
            "oldest" => Ok(SortBy::Oldest),
            "title" => Ok(SortBy::Title),
            "updated" => Ok(SortBy::Updated),
            "custom" => Ok(SortBy::Custom),
            _ => Err(format!(
                "Invalid sort '{}'. Must be one of: newest, oldest, title, updated, custom",
                s
            )),
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction for the `title` and `updated` sorts. `newest`/`oldest` carry
/// their own direction and `custom` has none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn toggled(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

/// Tag filter with the `"all"` sentinel meaning no filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TagFilter {
    #[default]
    All,
    Tag(String),
}

impl TagFilter {
    pub const ALL: &'static str = "all";

    pub fn parse(s: &str) -> Self {
        if s == Self::ALL {
            TagFilter::All
        } else {
            TagFilter::Tag(s.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TagFilter::All => Self::ALL,
            TagFilter::Tag(tag) => tag,
        }
    }
}

impl Serialize for TagFilter {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TagFilter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(TagFilter::parse(&s))
    }
}

// ---- Timestamps ----

pub fn format_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn now_timestamp() -> String {
    format_timestamp(&Local::now())
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    ACCEPTED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Local).naive_local())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> Note {
        NoteDraft::new("Groceries", "Milk and EGGS")
            .with_tags(["home", " errands ", "home", ""])
            .into_note(1, "2024/01/05 09:03:22".to_string())
    }

    #[test]
    fn test_draft_into_note() {
        let note = sample();
        assert_eq!(note.id, 1);
        assert_eq!(note.tags, vec!["home", "errands"]);
        assert!(!note.starred);
        assert!(!note.is_markdown);
        assert_eq!(note.updated_at, None);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["isMarkdown"], false);
        assert_eq!(json["createdAt"], "2024/01/05 09:03:22");
        assert_eq!(json["starred"], false);
        assert!(json.get("updatedAt").is_none());
        assert!(json.get("isStarred").is_none());
    }

    #[test]
    fn test_legacy_is_starred_accepted() {
        let raw = r#"{"id":7,"title":"t","content":"c","tags":["a"],"isStarred":true,"createdAt":"2024/1/5 9:03:22"}"#;
        let note: Note = serde_json::from_str(raw).unwrap();
        assert!(note.starred);
        assert!(!note.is_markdown);

        let back = serde_json::to_value(&note).unwrap();
        assert_eq!(back["starred"], true);
        assert!(back.get("isStarred").is_none());
    }

    #[test]
    fn test_validation() {
        assert_eq!(NoteDraft::new("", "body").validate(), Err(ValidationError::EmptyTitle));
        assert_eq!(NoteDraft::new("  ", "body").validate(), Err(ValidationError::EmptyTitle));
        assert_eq!(NoteDraft::new("t", " \n").validate(), Err(ValidationError::EmptyContent));
        assert!(NoteDraft::new("t", "body").validate().is_ok());

        let long = "x".repeat(51);
        assert_eq!(
            NoteDraft::new(long, "body").validate(),
            Err(ValidationError::TitleTooLong { len: 51, max: 50 })
        );
        // Limit counts characters, not bytes
        assert!(NoteDraft::new("笔".repeat(50), "body").validate().is_ok());

        let update = NoteUpdate {
            content: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(update.validate(), Err(ValidationError::EmptyContent));
        assert!(NoteUpdate::default().validate().is_ok());
    }

    #[test]
    fn test_plain_content_is_capped() {
        let long = "y".repeat(501);
        assert_eq!(
            NoteDraft::new("t", long.clone()).validate(),
            Err(ValidationError::ContentTooLong { len: 501, max: 500 })
        );
        assert!(NoteDraft::new("t", "y".repeat(500)).validate().is_ok());
        assert!(NoteDraft::new("t", long.clone()).markdown(true).validate().is_ok());

        let markdown_note = NoteDraft::new("t", long.clone())
            .markdown(true)
            .into_note(1, "2024/01/05 09:03:22".to_string());
        // Switching a long markdown note to plain text is rejected
        let to_plain = NoteUpdate {
            is_markdown: Some(false),
            ..Default::default()
        };
        assert_eq!(
            to_plain.validate_for(&markdown_note),
            Err(ValidationError::ContentTooLong { len: 501, max: 500 })
        );
        let retitle = NoteUpdate {
            title: Some("new".to_string()),
            ..Default::default()
        };
        assert!(retitle.validate_for(&markdown_note).is_ok());

        let plain_note = sample();
        let grow = NoteUpdate {
            content: Some(long),
            ..Default::default()
        };
        assert!(grow.validate().is_ok());
        assert!(grow.validate_for(&plain_note).is_err());
    }

    #[test]
    fn test_sort_order_toggles() {
        assert_eq!(SortOrder::default(), SortOrder::Desc);
        assert_eq!(SortOrder::Desc.toggled(), SortOrder::Asc);
        assert_eq!(serde_json::to_string(&SortOrder::Asc).unwrap(), "\"asc\"");
    }

    #[test]
    fn test_update_apply() {
        let mut note = sample();
        NoteUpdate {
            title: Some("Shopping".to_string()),
            tags: Some(vec!["x".to_string(), "x".to_string()]),
            is_markdown: Some(true),
            ..Default::default()
        }
        .apply(&mut note, "2024/01/06 10:00:00".to_string());

        assert_eq!(note.title, "Shopping");
        assert_eq!(note.content, "Milk and EGGS");
        assert_eq!(note.tags, vec!["x"]);
        assert!(note.is_markdown);
        assert_eq!(note.updated_at.as_deref(), Some("2024/01/06 10:00:00"));
        assert_eq!(note.created_at, "2024/01/05 09:03:22");
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let note = sample();
        assert!(note.matches("eggs"));
        assert!(note.matches("grocer"));
        assert!(!note.matches("bread"));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(9, 3, 22)
            .unwrap();
        assert_eq!(parse_timestamp("2024/01/05 09:03:22"), Some(expected));
        assert_eq!(parse_timestamp("2024/1/5 9:03:22"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-05 09:03:22"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert!(parse_timestamp("2024-01-05T09:03:22+00:00").is_some());
    }

    #[test]
    fn test_format_timestamp() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format_timestamp(&at), "2024/03/09 07:05:01");
    }

    #[test]
    fn test_last_touched_falls_back_to_created() {
        let mut note = sample();
        assert_eq!(note.last_touched(), note.created());
        note.updated_at = Some("2024/02/01 00:00:00".to_string());
        assert!(note.last_touched() > note.created());
    }

    #[test]
    fn test_sort_by_and_tag_filter_strings() {
        assert_eq!(SortBy::from_str("custom"), Ok(SortBy::Custom));
        assert!(SortBy::from_str("random").is_err());
        assert_eq!(serde_json::to_string(&SortBy::Updated).unwrap(), "\"updated\"");
        assert_eq!(SortBy::default(), SortBy::Newest);

        assert_eq!(TagFilter::parse("all"), TagFilter::All);
        assert_eq!(TagFilter::parse("work"), TagFilter::Tag("work".to_string()));
        assert_eq!(serde_json::to_string(&TagFilter::All).unwrap(), "\"all\"");
        let parsed: TagFilter = serde_json::from_str("\"work\"").unwrap();
        assert_eq!(parsed.as_str(), "work");
    }
}
