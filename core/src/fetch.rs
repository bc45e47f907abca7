//! Fetcher: pull the sidebar registry and the serial bot's comments into the
//! local caches.
//!
//! Every forum call yields an explicit `Result`. Transient failures (network,
//! rate limiting, 5xx) are retried a bounded number of times; anything else
//! ends the current sync early. Whatever was gathered before the failure is
//! still persisted by [`Fetcher::run`].

use std::future::Future;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};

use crate::comments::{BotComment, CommentLog};
use crate::config::FetchConfig;
use crate::error::StoreError;
use crate::forum::{ForumApi, ForumError};
use crate::registry::{Registry, RegistryEntry, parse_sidebar_line};
use crate::store::CacheStore;
use crate::time::format_utc;

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Entries added or completed.
    pub added: usize,
    /// Entries skipped because they were already cached.
    pub already_known: usize,
    /// Sidebar lines or comment bodies that did not match their pattern.
    pub unmatched: usize,
    /// Pages requested (comment sync only).
    pub pages: usize,
    /// Registry keys dropped by the purge rule.
    pub purged: Vec<String>,
    /// Set when a forum error cut the pass short.
    pub stopped_early: Option<String>,
}

/// Reports for a full fetch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchSummary {
    pub registry: SyncReport,
    pub comments: SyncReport,
}

pub struct Fetcher<'a> {
    api: &'a dyn ForumApi,
    subreddit: String,
    bot_username: String,
    config: FetchConfig,
}

impl<'a> Fetcher<'a> {
    pub fn new(
        api: &'a dyn ForumApi,
        subreddit: impl Into<String>,
        bot_username: impl Into<String>,
        config: FetchConfig,
    ) -> Self {
        Self {
            api,
            subreddit: subreddit.into(),
            bot_username: bot_username.into(),
            config,
        }
    }

    /// Sync both caches and write them back.
    pub async fn run(&self, store: &CacheStore) -> Result<FetchSummary, StoreError> {
        let mut registry = store.load_registry()?;
        let registry_report = self.sync_registry(&mut registry).await;
        store.save_registry(&registry)?;
        tracing::info!(
            path = %store.registry_path().display(),
            serials = registry.len(),
            added = registry_report.added,
            "registry saved"
        );

        // The sidebar is usually not a complete list of all issued serials;
        // the bot's comments fill in the rest.
        let mut comments = store.load_comments()?;
        let comment_report = self.sync_comments(&mut comments).await;
        store.save_comments(&comments)?;
        tracing::info!(
            path = %store.comments_path().display(),
            comments = comments.len(),
            added = comment_report.added,
            "comments saved"
        );

        Ok(FetchSummary {
            registry: registry_report,
            comments: comment_report,
        })
    }

    /// Merge the sidebar's serial links into `registry`, then purge
    /// malformed keys.
    pub async fn sync_registry(&self, registry: &mut Registry) -> SyncReport {
        let mut report = SyncReport::default();
        tracing::info!(subreddit = %self.subreddit, "fetching sidebar");

        match call_with_retries(&self.config, "sidebar", || {
            self.api.sidebar_text_blocks(&self.subreddit)
        })
        .await
        {
            Ok(blocks) => {
                if let Err(err) = self.merge_sidebar(&blocks, registry, &mut report).await {
                    tracing::error!(error = %err, "sidebar sync stopped early");
                    report.stopped_early = Some(err.to_string());
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to fetch sidebar");
                report.stopped_early = Some(err.to_string());
            }
        }

        report.purged = registry.purge_malformed();
        for code in &report.purged {
            tracing::debug!(serial = %code, "purged malformed registry key");
        }
        report
    }

    async fn merge_sidebar(
        &self,
        blocks: &[String],
        registry: &mut Registry,
        report: &mut SyncReport,
    ) -> Result<(), ForumError> {
        for line in blocks.iter().flat_map(|block| block.lines()) {
            let Some(link) = parse_sidebar_line(line) else {
                tracing::info!("No match: {line}");
                report.unmatched += 1;
                continue;
            };
            let code = link.code();
            if !registry.needs_lookup(&code) {
                tracing::info!("Already have serial {code}");
                report.already_known += 1;
                continue;
            }

            let lookup = call_with_retries(&self.config, "submission lookup", || {
                self.api.submission(&link.post_slug)
            })
            .await;
            match lookup {
                Ok(submission) => {
                    tracing::info!(
                        "Serial {code}: {} u/{} {}",
                        link.post_slug,
                        link.owner,
                        format_utc(submission.created_utc)
                    );
                    registry.record(
                        code,
                        RegistryEntry {
                            created_utc: submission.created_utc,
                            owner: link.owner,
                            post_id: Some(submission.id),
                        },
                    );
                    report.added += 1;
                }
                Err(ForumError::NotFound(what)) => {
                    tracing::warn!(serial = %code, post = %what, "sidebar links to a missing post, skipping");
                }
                Err(err) => return Err(err),
            }
            pause(self.config.throttle()).await;
        }
        Ok(())
    }

    /// Page through the bot's comments newer than what `log` already holds,
    /// then re-extract every serial.
    pub async fn sync_comments(&self, log: &mut CommentLog) -> SyncReport {
        let mut report = SyncReport::default();
        log.sort_by_time();
        let mut cursor = log.cursor().map(str::to_string);
        tracing::info!(bot = %self.bot_username, cursor = ?cursor, "fetching comments from the serial bot");

        loop {
            let page = call_with_retries(&self.config, "comment page", || {
                self.api
                    .user_comments(&self.bot_username, cursor.as_deref())
            })
            .await;
            let page = match page {
                Ok(page) => page,
                Err(err) => {
                    tracing::error!(error = %err, "comment paging stopped early");
                    report.stopped_early = Some(err.to_string());
                    break;
                }
            };
            report.pages += 1;

            match self.absorb_page(page, log, &mut report).await {
                Ok(Some(newest)) => cursor = Some(newest),
                Ok(None) => break,
                Err(err) => {
                    tracing::error!(error = %err, "comment paging stopped early");
                    report.stopped_early = Some(err.to_string());
                    break;
                }
            }
            pause(self.config.throttle()).await;
        }

        log.sort_by_time();
        report.unmatched = log.refresh_serials();
        report
    }

    /// Add the unseen comments of one page. Returns the id of the most
    /// recently created unseen comment, or `None` when every comment on the
    /// page was already cached. Unseen comments whose post is gone still move
    /// the cursor so the next page does not return them again.
    async fn absorb_page(
        &self,
        page: Vec<crate::forum::Comment>,
        log: &mut CommentLog,
        report: &mut SyncReport,
    ) -> Result<Option<String>, ForumError> {
        let mut newest: Option<(f64, String)> = None;
        for comment in page {
            if log.contains(&comment.id) {
                tracing::info!(
                    "Already have comment {}: {}",
                    format_utc(comment.created_utc),
                    comment.body
                );
                report.already_known += 1;
                continue;
            }
            if newest
                .as_ref()
                .is_none_or(|(created, _)| comment.created_utc > *created)
            {
                newest = Some((comment.created_utc, comment.id.clone()));
            }

            let lookup = call_with_retries(&self.config, "submission lookup", || {
                self.api.submission(&comment.link_id)
            })
            .await;
            let submission = match lookup {
                Ok(submission) => submission,
                Err(ForumError::NotFound(what)) => {
                    tracing::warn!(comment = %comment.id, post = %what, "comment belongs to a missing post, skipping");
                    continue;
                }
                Err(err) => return Err(err),
            };

            tracing::info!(
                "New comment at {}: {}",
                format_utc(comment.created_utc),
                comment.body
            );
            log.push(BotComment {
                id: comment.id,
                created_utc: comment.created_utc,
                body: comment.body,
                post_id: submission.id,
                post_created_utc: submission.created_utc,
                serial: None,
            });
            report.added += 1;
        }
        Ok(newest.map(|(_, id)| id))
    }
}

/// Run one forum call, retrying transient failures per `policy`.
///
/// Waits `retry_delay` between attempts, or the server's rate-limit hint
/// when that is longer.
pub(crate) async fn call_with_retries<T, F, Fut>(
    policy: &FetchConfig,
    what: &str,
    call: F,
) -> Result<T, ForumError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ForumError>>,
{
    let backoff = ConstantBuilder::default()
        .with_delay(policy.retry_delay())
        .with_max_times(policy.max_page_retries as usize);
    let mut attempt = 0;

    call.retry(backoff)
        .when(ForumError::is_transient)
        .adjust(|err: &ForumError, delay: Option<Duration>| {
            delay.map(|delay| err.suggested_backoff().map_or(delay, |hint| hint.max(delay)))
        })
        .notify(|err: &ForumError, delay: Duration| {
            attempt += 1;
            tracing::warn!(
                error = %err,
                attempt,
                max = policy.max_page_retries,
                delay_ms = delay.as_millis() as u64,
                "{what} failed, retrying"
            );
        })
        .await
}

/// Cooperative self-throttling between requests.
pub(crate) async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
