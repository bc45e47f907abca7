//! The forum API seam.
//!
//! Fetching and prediction only need a handful of read-only calls. They are
//! expressed as a trait so the Reddit client lives in its own crate and tests
//! can run against an in-memory forum.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A forum post (Reddit "link").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Short id without the `t3_` prefix.
    pub id: String,
    pub title: String,
    pub created_utc: f64,
    #[serde(default)]
    pub link_flair_text: Option<String>,
}

/// A comment written by the serial bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Short id without the `t1_` prefix.
    pub id: String,
    pub created_utc: f64,
    pub body: String,
    /// Id of the submission the comment belongs to, without `t3_`.
    pub link_id: String,
}

/// Failure of a single forum call.
#[derive(Debug, Error)]
pub enum ForumError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited{}", retry_after.map(|d| format!(", retry after {}s", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl ForumError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimited { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Auth(_) | Self::Decode(_) | Self::NotFound(_) => false,
        }
    }

    /// Server-suggested wait before the next attempt.
    pub fn suggested_backoff(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Read-only forum operations used by the fetcher and the predictor.
///
/// Paged calls return a single page; an empty page means there is nothing
/// beyond the cursor.
#[async_trait]
pub trait ForumApi: Send + Sync {
    /// Text of every text-area widget in the subreddit sidebar, in display
    /// order.
    async fn sidebar_text_blocks(&self, subreddit: &str) -> Result<Vec<String>, ForumError>;

    /// Look up a submission by its short id.
    async fn submission(&self, id: &str) -> Result<Submission, ForumError>;

    /// One page of `user`'s comments, newest first. With `before` set the
    /// page holds comments created after that comment.
    async fn user_comments(
        &self,
        user: &str,
        before: Option<&str>,
    ) -> Result<Vec<Comment>, ForumError>;

    /// One page of the subreddit's newest posts. With `after` set the page
    /// continues below (older than) that post.
    async fn subreddit_new(
        &self,
        subreddit: &str,
        after: Option<&str>,
    ) -> Result<Vec<Submission>, ForumError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory forum used by fetch and predict tests.

    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use super::*;

    /// Scripted forum: paged calls pop queued responses in order and return
    /// an empty page once the script runs out.
    #[derive(Default)]
    pub struct FakeForum {
        pub sidebar: Mutex<VecDeque<Result<Vec<String>, ForumError>>>,
        pub submissions: HashMap<String, Submission>,
        pub comment_pages: Mutex<VecDeque<Result<Vec<Comment>, ForumError>>>,
        pub new_pages: Mutex<VecDeque<Result<Vec<Submission>, ForumError>>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeForum {
        pub fn with_sidebar(self, blocks: &[&str]) -> Self {
            self.sidebar
                .lock()
                .unwrap()
                .push_back(Ok(blocks.iter().map(|b| b.to_string()).collect()));
            self
        }

        pub fn with_submission(mut self, id: &str, title: &str, created_utc: f64) -> Self {
            self.submissions
                .insert(id.to_string(), submission(id, title, created_utc, None));
            self
        }

        pub fn with_comment_page(self, page: Result<Vec<Comment>, ForumError>) -> Self {
            self.comment_pages.lock().unwrap().push_back(page);
            self
        }

        pub fn with_new_page(self, page: Result<Vec<Submission>, ForumError>) -> Self {
            self.new_pages.lock().unwrap().push_back(page);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn log(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    pub fn submission(id: &str, title: &str, created_utc: f64, flair: Option<&str>) -> Submission {
        Submission {
            id: id.to_string(),
            title: title.to_string(),
            created_utc,
            link_flair_text: flair.map(str::to_string),
        }
    }

    pub fn comment(id: &str, created_utc: f64, body: &str, link_id: &str) -> Comment {
        Comment {
            id: id.to_string(),
            created_utc,
            body: body.to_string(),
            link_id: link_id.to_string(),
        }
    }

    #[async_trait]
    impl ForumApi for FakeForum {
        async fn sidebar_text_blocks(&self, subreddit: &str) -> Result<Vec<String>, ForumError> {
            self.log(format!("sidebar {subreddit}"));
            self.sidebar
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn submission(&self, id: &str) -> Result<Submission, ForumError> {
            self.log(format!("submission {id}"));
            self.submissions
                .get(id)
                .cloned()
                .ok_or_else(|| ForumError::NotFound(id.to_string()))
        }

        async fn user_comments(
            &self,
            user: &str,
            before: Option<&str>,
        ) -> Result<Vec<Comment>, ForumError> {
            self.log(format!("comments {user} before={}", before.unwrap_or("-")));
            self.comment_pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn subreddit_new(
            &self,
            subreddit: &str,
            after: Option<&str>,
        ) -> Result<Vec<Submission>, ForumError> {
            self.log(format!("new {subreddit} after={}", after.unwrap_or("-")));
            self.new_pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ForumError::Network("reset".into()).is_transient());
        assert!(ForumError::RateLimited { retry_after: None }.is_transient());
        assert!(
            ForumError::Status {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !ForumError::Status {
                status: 404,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!ForumError::Auth("bad secret".into()).is_transient());
        assert!(!ForumError::Decode("missing data".into()).is_transient());
    }

    #[test]
    fn rate_limit_message_mentions_wait() {
        let err = ForumError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.to_string(), "rate limited, retry after 7s");
        assert_eq!(err.suggested_backoff(), Some(Duration::from_secs(7)));
    }
}
