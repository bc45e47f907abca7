//! Wire shapes of the Reddit JSON API. Only the fields the tracker reads are
//! modelled; everything else is ignored.

use std::collections::HashMap;

use serde::Deserialize;
use voron_serials_core::{Comment, Submission};

/// `{"kind": "Listing", "data": {"children": [...], "after": ..., "before": ...}}`
#[derive(Debug, Deserialize)]
pub(crate) struct Listing<T> {
    pub data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListingData<T> {
    #[serde(default = "Vec::new")]
    pub children: Vec<Thing<T>>,
}

/// `{"kind": "t3", "data": {...}}`
#[derive(Debug, Deserialize)]
pub(crate) struct Thing<T> {
    pub data: T,
}

impl<T> Listing<T> {
    pub fn into_items(self) -> Vec<T> {
        self.data.children.into_iter().map(|thing| thing.data).collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LinkData {
    pub id: String,
    pub title: String,
    pub created_utc: f64,
    #[serde(default)]
    pub link_flair_text: Option<String>,
}

impl From<LinkData> for Submission {
    fn from(link: LinkData) -> Self {
        Submission {
            id: link.id,
            title: link.title,
            created_utc: link.created_utc,
            link_flair_text: link.link_flair_text,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentData {
    pub id: String,
    pub created_utc: f64,
    pub body: String,
    /// Fullname of the parent submission (`t3_abc123`).
    pub link_id: String,
}

impl From<CommentData> for Comment {
    fn from(comment: CommentData) -> Self {
        let link_id = comment
            .link_id
            .strip_prefix("t3_")
            .map(str::to_string)
            .unwrap_or(comment.link_id);
        Comment {
            id: comment.id,
            created_utc: comment.created_utc,
            body: comment.body,
            link_id,
        }
    }
}

/// `GET /r/{sub}/api/widgets`
#[derive(Debug, Deserialize)]
pub(crate) struct WidgetsResponse {
    #[serde(default)]
    pub items: HashMap<String, Widget>,
    pub layout: WidgetLayout,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Widget {
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WidgetLayout {
    pub sidebar: SidebarLayout,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SidebarLayout {
    #[serde(default)]
    pub order: Vec<String>,
}

impl WidgetsResponse {
    /// Markdown of the text-area widgets, in sidebar order.
    pub fn sidebar_text_blocks(mut self) -> Vec<String> {
        self.layout
            .sidebar
            .order
            .iter()
            .filter_map(|id| self.items.remove(id))
            .filter(|widget| widget.kind == "textarea")
            .filter_map(|widget| widget.text)
            .collect()
    }
}

/// `POST /api/v1/access_token`
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}
