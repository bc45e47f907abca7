//! Reddit implementation of [`voron_serials_core::ForumApi`].
//!
//! Uses the application-only OAuth flow (client credentials), which is all
//! the read-only endpoints below need:
//!
//! - `GET /r/{sub}/api/widgets` for the sidebar registry
//! - `GET /by_id/t3_{id}` for submission lookups
//! - `GET /user/{name}/comments` for the serial bot's history
//! - `GET /r/{sub}/new` for the request queue

mod auth;
mod client;
mod types;

pub use auth::Credentials;
pub use client::{RedditClient, RedditConfig};
