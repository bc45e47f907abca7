//! Serial bot comment history.
//!
//! The bot confirms every issued serial with a comment starting
//! `Congrats on V2.1234!`. The sidebar is usually behind, so these comments
//! fill in serials the registry does not list yet.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

static CONGRATS: Lazy<Regex> = Lazy::new(congrats_pattern);

#[allow(clippy::expect_used)] // constant pattern
fn congrats_pattern() -> Regex {
    Regex::new(r"^Congrats on ([A-Z0-9]+\.[0-9]+)!").expect("valid congrats pattern")
}

/// A cached bot comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotComment {
    pub id: String,
    pub created_utc: f64,
    pub body: String,
    /// Submission the comment was posted on.
    pub post_id: String,
    pub post_created_utc: f64,
    /// Serial extracted from `body`, if it matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

/// Pull the issued serial out of a bot comment body.
pub fn extract_serial(body: &str) -> Option<String> {
    CONGRATS
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Time-ordered, id-unique collection of bot comments. Serialized as a
/// JSON array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentLog {
    comments: Vec<BotComment>,
    seen: HashSet<String>,
}

impl CommentLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a deserialized cache. Later duplicates of an id are
    /// dropped; the result is sorted by creation time.
    pub fn from_comments(comments: Vec<BotComment>) -> Self {
        let mut log = Self::new();
        for comment in comments {
            log.push(comment);
        }
        log.sort_by_time();
        log
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn comments(&self) -> &[BotComment] {
        &self.comments
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Append a comment unless its id is already known. Returns whether the
    /// comment was added; an existing entry is never modified.
    pub fn push(&mut self, comment: BotComment) -> bool {
        if !self.seen.insert(comment.id.clone()) {
            return false;
        }
        self.comments.push(comment);
        true
    }

    /// Stable sort by `created_utc`.
    pub fn sort_by_time(&mut self) {
        self.comments
            .sort_by(|a, b| a.created_utc.total_cmp(&b.created_utc));
    }

    /// Id of the most recently created comment, used as the `before` paging
    /// cursor so the next page starts just after what is already cached.
    pub fn cursor(&self) -> Option<&str> {
        self.comments
            .iter()
            .max_by(|a, b| a.created_utc.total_cmp(&b.created_utc))
            .map(|comment| comment.id.as_str())
    }

    /// Re-extract the serial of every comment. Returns how many bodies did
    /// not match; those comments are kept without a serial.
    pub fn refresh_serials(&mut self) -> usize {
        let mut unmatched = 0;
        for comment in &mut self.comments {
            comment.serial = extract_serial(&comment.body);
            if comment.serial.is_none() {
                unmatched += 1;
                tracing::warn!(id = %comment.id, body = %comment.body, "comment does not match pattern");
            }
        }
        unmatched
    }
}

impl Serialize for CommentLog {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.comments.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CommentLog {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<BotComment>::deserialize(deserializer).map(Self::from_comments)
    }
}
