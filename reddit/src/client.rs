use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use voron_serials_core::{Comment, ForumApi, ForumError, Submission};

use crate::auth::{Credentials, TokenCache};
use crate::types::{CommentData, LinkData, Listing, WidgetsResponse};

/// OAuth API host.
const API_BASE: &str = "https://oauth.reddit.com";

/// Token endpoint host.
const AUTH_BASE: &str = "https://www.reddit.com";

/// Largest page Reddit serves.
const PAGE_LIMIT: &str = "100";

/// Endpoint and transport settings.
#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub api_base: String,
    pub auth_base: String,
    /// Reddit rejects generic user agents; use `<platform>:<app>:<version> (by u/<name>)`.
    pub user_agent: String,
    pub timeout: Duration,
}

impl RedditConfig {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            api_base: API_BASE.to_string(),
            auth_base: AUTH_BASE.to_string(),
            user_agent: user_agent.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Point both hosts at `base` (used against a mock server).
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        self.api_base = base.clone();
        self.auth_base = base;
        self
    }
}

/// Reddit API client.
pub struct RedditClient {
    http: reqwest::Client,
    api_base: String,
    token: TokenCache,
}

impl RedditClient {
    pub fn new(credentials: Credentials, config: RedditConfig) -> Result<Self, ForumError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()
            .map_err(|e| ForumError::Network(format!("failed to build HTTP client: {e}")))?;
        let token_url = format!(
            "{}/api/v1/access_token",
            config.auth_base.trim_end_matches('/')
        );
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: TokenCache::new(credentials, token_url),
        })
    }

    /// Fetch the token up front so bad credentials fail before any work.
    pub async fn authenticate(&self) -> Result<(), ForumError> {
        self.token.bearer(&self.http).await.map(|_| ())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ForumError> {
        let token = self.token.bearer(&self.http).await?;
        let url = format!("{}{path}", self.api_base);
        tracing::debug!(%url, ?query, "GET");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .query(&[("raw_json", "1")])
            .send()
            .await
            .map_err(|e| ForumError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let hint = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, hint, body));
        }
        response
            .json()
            .await
            .map_err(|e| ForumError::Decode(format!("{path}: {e}")))
    }
}

fn status_error(status: StatusCode, hint: Option<Duration>, body: String) -> ForumError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ForumError::RateLimited { retry_after: hint },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ForumError::Auth(format!("HTTP {}", status.as_u16()))
        }
        StatusCode::NOT_FOUND => ForumError::NotFound(body),
        _ => ForumError::Status {
            status: status.as_u16(),
            body,
        },
    }
}

/// `Retry-After`, falling back to Reddit's `x-ratelimit-reset` (seconds).
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    [RETRY_AFTER.as_str(), "x-ratelimit-reset"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| value.trim().parse::<f64>().ok())
        .map(|secs| Duration::from_secs_f64(secs.max(0.0)))
}

#[async_trait]
impl ForumApi for RedditClient {
    async fn sidebar_text_blocks(&self, subreddit: &str) -> Result<Vec<String>, ForumError> {
        let widgets: WidgetsResponse = self
            .get_json(&format!("/r/{subreddit}/api/widgets"), &[])
            .await?;
        Ok(widgets.sidebar_text_blocks())
    }

    async fn submission(&self, id: &str) -> Result<Submission, ForumError> {
        let listing: Listing<LinkData> = self.get_json(&format!("/by_id/t3_{id}"), &[]).await?;
        listing
            .into_items()
            .into_iter()
            .next()
            .map(Submission::from)
            .ok_or_else(|| ForumError::NotFound(format!("t3_{id}")))
    }

    async fn user_comments(
        &self,
        user: &str,
        before: Option<&str>,
    ) -> Result<Vec<Comment>, ForumError> {
        let before = before.map(|id| format!("t1_{id}"));
        let mut query = vec![("sort", "new"), ("limit", PAGE_LIMIT)];
        if let Some(before) = before.as_deref() {
            query.push(("before", before));
        }
        let listing: Listing<CommentData> = self
            .get_json(&format!("/user/{user}/comments"), &query)
            .await?;
        Ok(listing.into_items().into_iter().map(Comment::from).collect())
    }

    async fn subreddit_new(
        &self,
        subreddit: &str,
        after: Option<&str>,
    ) -> Result<Vec<Submission>, ForumError> {
        let after = after.map(|id| format!("t3_{id}"));
        let mut query = vec![("limit", PAGE_LIMIT)];
        if let Some(after) = after.as_deref() {
            query.push(("after", after));
        }
        let listing: Listing<LinkData> = self
            .get_json(&format!("/r/{subreddit}/new"), &query)
            .await?;
        Ok(listing
            .into_items()
            .into_iter()
            .map(Submission::from)
            .collect())
    }
}
