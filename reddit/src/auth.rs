//! Application-only OAuth (client credentials grant).

use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use voron_serials_core::ForumError;

use crate::types::TokenResponse;

/// Refresh this long before the server-side expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Reddit "script"/"web" app credentials.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Fetches and caches the bearer token.
pub(crate) struct TokenCache {
    credentials: Credentials,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(credentials: Credentials, token_url: String) -> Self {
        Self {
            credentials,
            token_url,
            cached: Mutex::new(None),
        }
    }

    /// Current bearer token, requesting a new one when missing or close to
    /// expiry.
    pub async fn bearer(&self, http: &reqwest::Client) -> Result<String, ForumError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let token = self.request(http).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn request(&self, http: &reqwest::Client) -> Result<CachedToken, ForumError> {
        tracing::debug!(url = %self.token_url, "requesting access token");
        let response = http
            .post(&self.token_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ForumError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ForumError::Auth(format!(
                "token endpoint returned {status}; check --client-id and --secret"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForumError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ForumError::Decode(format!("token response: {e}")))?;
        if let Some(error) = token.error {
            return Err(ForumError::Auth(error));
        }
        let value = token
            .access_token
            .ok_or_else(|| ForumError::Decode("token response without access_token".into()))?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        Ok(CachedToken {
            value,
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        })
    }
}
