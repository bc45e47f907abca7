//! Predictor: guess which serial each pending request will receive.
//!
//! Per request post:
//!
//! ```text
//! pending ─flair?─▶ discard
//!    │
//!    ▼
//! candidate ─title?─▶ other (listed, not numbered)
//!    │
//!    ▼
//! V2.4 candidate ─reject list?─▶ rejected
//!    │
//!    ▼
//! predicted (next number in line)
//! ```

use std::collections::BTreeSet;
use std::fmt;

use crate::comments::CommentLog;
use crate::config::{FetchConfig, PredictConfig};
use crate::error::PredictError;
use crate::fetch::{call_with_retries, pause};
use crate::forum::{ForumApi, ForumError};
use crate::registry::Registry;
use crate::serial::{SerialCode, in_lineage};
use crate::store::CacheStore;

/// Titles containing any of these are never numbered in the main lineage.
const EXCLUDED_TITLE_FRAGMENTS: &[&str] = &[
    "transfer",
    "v0.1 serial request",
    "v0.0 serial request",
    "v0 serial request",
];

/// Most recently issued serial of a lineage.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestIssued {
    pub code: String,
    /// Creation time of the request post that received the serial.
    pub created_utc: f64,
    pub post_id: Option<String>,
}

/// Pick the serial of `lineage` whose request post is newest, looking at the
/// registry first and then the bot comments.
pub fn latest_issued(
    registry: &Registry,
    comments: &CommentLog,
    lineage: &str,
) -> Option<LatestIssued> {
    let from_registry = registry
        .iter()
        .filter(|(code, _)| in_lineage(code, lineage))
        .map(|(code, entry)| LatestIssued {
            code: code.to_string(),
            created_utc: entry.created_utc,
            post_id: entry.post_id.clone(),
        });
    let from_comments = comments.comments().iter().filter_map(|comment| {
        let code = comment.serial.as_deref()?;
        in_lineage(code, lineage).then(|| LatestIssued {
            code: code.to_string(),
            created_utc: comment.post_created_utc,
            post_id: Some(comment.post_id.clone()),
        })
    });

    let mut latest: Option<LatestIssued> = None;
    for candidate in from_registry.chain(from_comments) {
        if latest
            .as_ref()
            .is_none_or(|current| candidate.created_utc > current.created_utc)
        {
            latest = Some(candidate);
        }
    }
    latest
}

/// Lineage a request title appears to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessedLineage {
    /// Current Voron 2.4 numbering.
    V24,
    Other,
}

impl GuessedLineage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V24 => "V2.4",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for GuessedLineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Guess the lineage from a request title. First matching rule wins.
pub fn classify(title: &str) -> GuessedLineage {
    let title = title.to_lowercase();
    if EXCLUDED_TITLE_FRAGMENTS
        .iter()
        .any(|fragment| title.contains(fragment))
    {
        return GuessedLineage::Other;
    }
    if title.contains("2.4") || title.contains("v2") {
        return GuessedLineage::V24;
    }
    GuessedLineage::Other
}

/// A serial request post newer than the latest issued serial.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub id: String,
    pub title: String,
    pub created_utc: f64,
    pub guessed: GuessedLineage,
}

impl PendingRequest {
    pub fn url(&self) -> String {
        format!("https://reddit.com/{}", self.id)
    }
}

/// Walk the subreddit's newest posts until reaching the latest issued
/// serial's request, collecting request posts. Sorted oldest first.
pub async fn collect_backlog(
    api: &dyn ForumApi,
    subreddit: &str,
    request_flair: &str,
    issued_through: f64,
    policy: &FetchConfig,
) -> Result<Vec<PendingRequest>, ForumError> {
    let mut backlog = Vec::new();
    let mut after: Option<String> = None;

    'pages: loop {
        let page = call_with_retries(policy, "new posts page", || {
            api.subreddit_new(subreddit, after.as_deref())
        })
        .await?;
        if page.is_empty() {
            break;
        }
        for post in page {
            after = Some(post.id.clone());
            if post.link_flair_text.as_deref() != Some(request_flair) {
                continue;
            }
            if post.created_utc <= issued_through {
                tracing::debug!(post = %post.id, "reached the latest issued serial");
                break 'pages;
            }
            backlog.push(PendingRequest {
                guessed: classify(&post.title),
                id: post.id,
                title: post.title,
                created_utc: post.created_utc,
            });
        }
        pause(policy.throttle()).await;
    }

    backlog.sort_by(|a, b| a.created_utc.total_cmp(&b.created_utc));
    Ok(backlog)
}

/// One line of the prediction list.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionEntry {
    Predicted {
        code: SerialCode,
        request: PendingRequest,
    },
    Rejected(PendingRequest),
    /// Everything after this point has not been screened for rejects.
    UncheckedMarker,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prediction {
    pub entries: Vec<PredictionEntry>,
}

impl Prediction {
    pub fn predicted(&self) -> impl Iterator<Item = (&SerialCode, &PendingRequest)> {
        self.entries.iter().filter_map(|entry| match entry {
            PredictionEntry::Predicted { code, request } => Some((code, request)),
            _ => None,
        })
    }
}

/// Number the `V2.4` requests of `backlog` (oldest first) starting after
/// `latest`, skipping listed rejects.
pub fn predict(
    latest: &LatestIssued,
    backlog: &[PendingRequest],
    rejects: &BTreeSet<String>,
    rejects_checked_through: f64,
) -> Result<Prediction, PredictError> {
    let mut next = SerialCode::parse(&latest.code)
        .ok_or_else(|| PredictError::UnparseableSerial(latest.code.clone()))?
        .next();
    let mut prediction = Prediction::default();
    let mut flagged_unchecked = false;

    for request in backlog
        .iter()
        .filter(|request| request.guessed == GuessedLineage::V24)
    {
        if rejects.contains(&request.id) {
            prediction
                .entries
                .push(PredictionEntry::Rejected(request.clone()));
            continue;
        }
        if request.created_utc > rejects_checked_through && !flagged_unchecked {
            prediction.entries.push(PredictionEntry::UncheckedMarker);
            flagged_unchecked = true;
        }
        let following = next.next();
        prediction.entries.push(PredictionEntry::Predicted {
            code: std::mem::replace(&mut next, following),
            request: request.clone(),
        });
    }
    Ok(prediction)
}

/// Everything the predictor prints.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub latest: LatestIssued,
    pub backlog: Vec<PendingRequest>,
    pub prediction: Prediction,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Last serial number issued: {:.0} {} {}",
            self.latest.created_utc,
            self.latest.code,
            self.latest.post_id.as_deref().unwrap_or("-")
        )?;
        writeln!(f)?;
        writeln!(f, "Queue:")?;
        for request in &self.backlog {
            writeln!(
                f,
                "{:.0}: {:<5} \"{}\" {}",
                request.created_utc,
                request.guessed,
                request.title,
                request.url()
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Predictions:")?;
        for entry in &self.prediction.entries {
            match entry {
                PredictionEntry::Rejected(request) => writeln!(
                    f,
                    "Reject: {:.0} {} {}",
                    request.created_utc,
                    request.title,
                    request.url()
                )?,
                PredictionEntry::UncheckedMarker => writeln!(f, "Rejects not checked:")?,
                PredictionEntry::Predicted { code, request } => writeln!(
                    f,
                    "{code}: {:.0} {} {}",
                    request.created_utc,
                    request.title,
                    request.url()
                )?,
            }
        }
        Ok(())
    }
}

/// Reads the caches, walks the request queue and builds the report.
pub struct Predictor<'a> {
    api: &'a dyn ForumApi,
    subreddit: String,
    config: PredictConfig,
    policy: FetchConfig,
}

impl<'a> Predictor<'a> {
    pub fn new(
        api: &'a dyn ForumApi,
        subreddit: impl Into<String>,
        config: PredictConfig,
        policy: FetchConfig,
    ) -> Self {
        Self {
            api,
            subreddit: subreddit.into(),
            config,
            policy,
        }
    }

    /// Determine the latest issued serial from the caches. Both caches must
    /// exist.
    pub fn latest_from_cache(&self, store: &CacheStore) -> Result<LatestIssued, PredictError> {
        let registry = store.require_registry()?;
        let comments = store.require_comments()?;
        latest_issued(&registry, &comments, &self.config.lineage).ok_or_else(|| {
            PredictError::NoIssuedSerial {
                lineage: self.config.lineage.clone(),
            }
        })
    }

    pub async fn run(&self, store: &CacheStore) -> Result<Report, PredictError> {
        let latest = self.latest_from_cache(store)?;
        tracing::info!(
            serial = %latest.code,
            created_utc = latest.created_utc,
            "latest issued serial"
        );

        let backlog = collect_backlog(
            self.api,
            &self.subreddit,
            &self.config.request_flair,
            latest.created_utc,
            &self.policy,
        )
        .await?;
        tracing::info!(pending = backlog.len(), "collected request backlog");

        let prediction = predict(
            &latest,
            &backlog,
            &self.config.rejects,
            self.config.rejects_checked_through,
        )?;
        Ok(Report {
            latest,
            backlog,
            prediction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::BotComment;
    use crate::forum::testing::{FakeForum, submission};
    use crate::registry::RegistryEntry;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const FLAIR: &str = "Serial Request:snoo_scream:";

    fn registry_entry(created_utc: f64, post_id: &str) -> RegistryEntry {
        RegistryEntry {
            created_utc,
            owner: "owner".into(),
            post_id: Some(post_id.into()),
        }
    }

    fn bot_comment(id: &str, serial: Option<&str>, post_created_utc: f64) -> BotComment {
        BotComment {
            id: id.into(),
            created_utc: post_created_utc + 1000.0,
            body: serial.map_or("Needs photos".to_string(), |s| format!("Congrats on {s}!")),
            post_id: format!("post_{id}"),
            post_created_utc,
            serial: serial.map(str::to_string),
        }
    }

    fn request(id: &str, created_utc: f64) -> PendingRequest {
        PendingRequest {
            id: id.into(),
            title: format!("V2.4 Serial Request {id}"),
            created_utc,
            guessed: GuessedLineage::V24,
        }
    }

    fn latest(code: &str, created_utc: f64) -> LatestIssued {
        LatestIssued {
            code: code.into(),
            created_utc,
            post_id: Some("p".into()),
        }
    }

    #[test]
    fn latest_issued_prefers_newest_request_across_sources() {
        let mut registry = Registry::new();
        registry.record("V2.10", registry_entry(100.0, "p10"));
        registry.record("V2.11", registry_entry(200.0, "p11"));
        registry.record("V1.999", registry_entry(900.0, "old"));
        let comments = CommentLog::from_comments(vec![
            bot_comment("c9", Some("V2.9"), 50.0),
            bot_comment("cx", None, 990.0),
        ]);

        let latest = latest_issued(&registry, &comments, "V2").unwrap();

        assert_eq!(
            latest,
            LatestIssued {
                code: "V2.11".into(),
                created_utc: 200.0,
                post_id: Some("p11".into()),
            }
        );
    }

    #[test]
    fn latest_issued_can_come_from_comments() {
        let mut registry = Registry::new();
        registry.record("V2.10", registry_entry(100.0, "p10"));
        let comments =
            CommentLog::from_comments(vec![bot_comment("c12", Some("V2.12"), 300.0)]);

        let latest = latest_issued(&registry, &comments, "V2").unwrap();

        assert_eq!(latest.code, "V2.12");
        assert_eq!(latest.post_id.as_deref(), Some("post_c12"));
    }

    #[test]
    fn latest_issued_none_without_lineage() {
        let mut registry = Registry::new();
        registry.record("V1.056", registry_entry(100.0, "p"));
        assert_eq!(latest_issued(&registry, &CommentLog::new(), "V2"), None);
    }

    #[test]
    fn title_classifier() {
        assert_eq!(classify("V2.4 Serial Request"), GuessedLineage::V24);
        assert_eq!(classify("v2 serial request please"), GuessedLineage::V24);
        assert_eq!(classify("Serial request: 2.4 350mm"), GuessedLineage::V24);
        assert_eq!(classify("V2 Transfer Request"), GuessedLineage::Other);
        assert_eq!(classify("V0 Serial Request"), GuessedLineage::Other);
        assert_eq!(classify("V0.1 serial request"), GuessedLineage::Other);
        assert_eq!(classify("V0.0 Serial Request"), GuessedLineage::Other);
        assert_eq!(classify("Trident serial request"), GuessedLineage::Other);
        assert_eq!(classify("Random build log"), GuessedLineage::Other);
    }

    #[test]
    fn sequential_prediction_skips_rejects() {
        let backlog = vec![request("a", 10.0), request("b", 20.0), request("c", 30.0)];
        let rejects: BTreeSet<String> = ["b".to_string()].into();

        let prediction = predict(&latest("V2.11", 5.0), &backlog, &rejects, 100.0).unwrap();

        assert_eq!(
            prediction.entries,
            vec![
                PredictionEntry::Predicted {
                    code: SerialCode::parse("V2.12").unwrap(),
                    request: request("a", 10.0),
                },
                PredictionEntry::Rejected(request("b", 20.0)),
                PredictionEntry::Predicted {
                    code: SerialCode::parse("V2.13").unwrap(),
                    request: request("c", 30.0),
                },
            ]
        );
    }

    #[test]
    fn unchecked_marker_appears_once() {
        let backlog = vec![
            request("a", 10.0),
            request("b", 20.0),
            request("c", 30.0),
            request("d", 40.0),
        ];
        let rejects: BTreeSet<String> = ["c".to_string()].into();

        let prediction = predict(&latest("V2.11", 5.0), &backlog, &rejects, 15.0).unwrap();

        let markers = prediction
            .entries
            .iter()
            .filter(|e| matches!(e, PredictionEntry::UncheckedMarker))
            .count();
        assert_eq!(markers, 1);
        assert_eq!(prediction.entries[1], PredictionEntry::UncheckedMarker);
        let numbered: Vec<(String, &str)> = prediction
            .predicted()
            .map(|(code, req)| (code.to_string(), req.id.as_str()))
            .collect();
        assert_eq!(
            numbered,
            vec![
                ("V2.12".to_string(), "a"),
                ("V2.13".to_string(), "b"),
                ("V2.14".to_string(), "d"),
            ]
        );
    }

    #[test]
    fn other_lineage_requests_are_not_numbered() {
        let mut other = request("x", 15.0);
        other.guessed = GuessedLineage::Other;
        let backlog = vec![request("a", 10.0), other, request("b", 20.0)];

        let prediction =
            predict(&latest("V2.11", 5.0), &backlog, &BTreeSet::new(), 100.0).unwrap();

        let ids: Vec<&str> = prediction.predicted().map(|(_, r)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn unparseable_latest_is_an_error() {
        let err = predict(&latest("V2", 5.0), &[], &BTreeSet::new(), 0.0).unwrap_err();
        assert!(matches!(err, PredictError::UnparseableSerial(_)), "{err}");
    }

    #[tokio::test]
    async fn backlog_stops_at_latest_issued() {
        let api = FakeForum::default()
            .with_new_page(Ok(vec![
                submission("n4", "V2.4 serial request", 400.0, Some(FLAIR)),
                submission("chat", "Look at my V2", 390.0, Some("Show and Tell")),
                submission("n3", "V2 Transfer Request", 300.0, Some(FLAIR)),
            ]))
            .with_new_page(Ok(vec![
                submission("n2", "Serial request 2.4", 250.0, Some(FLAIR)),
                submission("n1", "V2.4 serial request", 200.0, Some(FLAIR)),
                submission("n0", "V2.4 serial request", 150.0, Some(FLAIR)),
            ]))
            .with_new_page(Ok(vec![submission(
                "older",
                "V2.4 serial request",
                100.0,
                Some(FLAIR),
            )]));

        let backlog = collect_backlog(&api, "voroncorexy", FLAIR, 200.0, &FetchConfig::unthrottled())
            .await
            .unwrap();

        let summary: Vec<(&str, GuessedLineage)> = backlog
            .iter()
            .map(|r| (r.id.as_str(), r.guessed))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("n2", GuessedLineage::V24),
                ("n3", GuessedLineage::Other),
                ("n4", GuessedLineage::V24),
            ]
        );
        assert_eq!(
            api.calls(),
            vec!["new voroncorexy after=-", "new voroncorexy after=n3"]
        );
    }

    #[tokio::test]
    async fn backlog_ends_on_empty_page() {
        let api = FakeForum::default().with_new_page(Ok(vec![submission(
            "n9",
            "V2.4 serial request",
            900.0,
            Some(FLAIR),
        )]));

        let backlog = collect_backlog(&api, "voroncorexy", FLAIR, 200.0, &FetchConfig::unthrottled())
            .await
            .unwrap();

        assert_eq!(backlog.len(), 1);
        assert_eq!(api.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn backlog_pages_are_throttled() {
        let api = FakeForum::default()
            .with_new_page(Ok(vec![submission("n9", "V2.4 serial request", 900.0, Some(FLAIR))]))
            .with_new_page(Ok(vec![submission("n8", "Build log", 800.0, None)]));
        let start = tokio::time::Instant::now();

        let backlog = collect_backlog(&api, "voroncorexy", FLAIR, 200.0, &FetchConfig::default())
            .await
            .unwrap();

        assert_eq!(backlog.len(), 1);
        assert_eq!(api.calls().len(), 3);
        let waited = start.elapsed();
        assert!(waited >= std::time::Duration::from_secs(2), "waited {waited:?}");
        assert!(waited < std::time::Duration::from_secs(3), "waited {waited:?}");
    }

    #[tokio::test]
    async fn predictor_requires_caches() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::in_dir(dir.path());
        let api = FakeForum::default();
        let predictor = Predictor::new(
            &api,
            "voroncorexy",
            PredictConfig::default(),
            FetchConfig::unthrottled(),
        );

        let err = predictor.run(&store).await.unwrap_err();

        assert!(matches!(err, PredictError::Store(_)), "{err}");
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn report_renders_queue_and_predictions() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::in_dir(dir.path());
        let mut registry = Registry::new();
        registry.record("V2.11", registry_entry(200.0, "p11"));
        store.save_registry(&registry).unwrap();
        store.save_comments(&CommentLog::new()).unwrap();

        let api = FakeForum::default().with_new_page(Ok(vec![
            submission("c", "V2.4 Serial Request", 500.0, Some(FLAIR)),
            submission("t", "V2 transfer request", 450.0, Some(FLAIR)),
            submission("b", "V2.4 Serial Request", 400.0, Some(FLAIR)),
            submission("a", "V2.4 Serial Request", 300.0, Some(FLAIR)),
            submission("p11", "V2.4 Serial Request", 200.0, Some(FLAIR)),
        ]));
        let config = PredictConfig {
            rejects: ["b".to_string()].into(),
            rejects_checked_through: 450.0,
            ..PredictConfig::default()
        };
        let predictor = Predictor::new(&api, "voroncorexy", config, FetchConfig::unthrottled());

        let report = predictor.run(&store).await.unwrap();

        assert_eq!(
            report.to_string(),
            "\
Last serial number issued: 200 V2.11 p11

Queue:
300: V2.4  \"V2.4 Serial Request\" https://reddit.com/a
400: V2.4  \"V2.4 Serial Request\" https://reddit.com/b
450: other \"V2 transfer request\" https://reddit.com/t
500: V2.4  \"V2.4 Serial Request\" https://reddit.com/c

Predictions:
V2.12: 300 V2.4 Serial Request https://reddit.com/a
Reject: 400 V2.4 Serial Request https://reddit.com/b
Rejects not checked:
V2.13: 500 V2.4 Serial Request https://reddit.com/c
"
        );
    }
}
