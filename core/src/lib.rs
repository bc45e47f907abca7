//! Serial-number bookkeeping for the r/voroncorexy community.
//!
//! Two sources of truth are reconciled into a local JSON cache:
//! - the curated sidebar registry (text-area widgets listing issued serials)
//! - the serial bot's comment history ("Congrats on V2.1234!")
//!
//! The cache then feeds a predictor that walks the backlog of pending
//! serial requests and guesses which number each one will receive.
//!
//! Network access goes through the [`forum::ForumApi`] trait so the fetch and
//! prediction logic can run against an in-memory forum in tests.

pub mod comments;
pub mod config;
pub mod error;
pub mod fetch;
pub mod forum;
pub mod predict;
pub mod registry;
pub mod serial;
pub mod store;
pub mod time;

pub use comments::{BotComment, CommentLog};
pub use config::SerialsConfig;
pub use error::{ConfigError, PredictError, StoreError};
pub use fetch::{Fetcher, SyncReport};
pub use forum::{Comment, ForumApi, ForumError, Submission};
pub use predict::{GuessedLineage, LatestIssued, PendingRequest, Prediction, Report};
pub use registry::{Registry, RegistryEntry};
pub use store::CacheStore;

/// Default subreddit whose sidebar and request queue are scanned.
pub const DEFAULT_SUBREDDIT: &str = "voroncorexy";

/// Default registry cache filename (JSON object keyed by serial).
pub const DEFAULT_REGISTRY_FILENAME: &str = "sidebar_serials.json";

/// Default bot comment cache filename (JSON array ordered by time).
pub const DEFAULT_COMMENTS_FILENAME: &str = "bot_comments.json";
