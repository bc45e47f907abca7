//! Sidebar serial registry.
//!
//! The sidebar lists issued serials as markdown links to the request post,
//! followed by the owner's handle:
//!
//! ```text
//! [V2.1234](https://redd.it/abc123/) (u/someone)
//! [V2.1235](https://www.reddit.com/r/voroncorexy/comments/abc124/my_build/) (/u/other)
//! ```

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::serial;

static SHORT_LINK: Lazy<Regex> =
    Lazy::new(|| compile(r"^\[([A-Z0-9.]+)\]\(https://redd\.it/([0-9a-z]+)/*\) *\(/?u/([^)]+)\)"));

static LONG_LINK: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"^\[([A-Z0-9.]+)\]\(https://www\.reddit\.com/r/voroncorexy/comments/([0-9a-z]+)/*[0-9a-zA-Z_]*/*\) *\(/?u/([^)]+)\)",
    )
});

#[allow(clippy::expect_used)] // patterns are compile-time constants
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid sidebar pattern")
}

/// Details recorded for an issued serial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Creation time of the request post (epoch seconds).
    pub created_utc: f64,
    /// Handle of the serial owner, without the `u/` prefix.
    pub owner: String,
    /// Request post id. Older caches may lack it; such entries are looked up
    /// again on the next fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
}

/// One sidebar line that matched a registry link pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarLink {
    /// Serial exactly as written on the sidebar (not yet normalized).
    pub raw_code: String,
    /// Short id of the request post.
    pub post_slug: String,
    pub owner: String,
}

impl SidebarLink {
    pub fn code(&self) -> String {
        serial::normalize(&self.raw_code)
    }
}

/// Match a sidebar line against the short-form link, then the canonical
/// long-form link.
pub fn parse_sidebar_line(line: &str) -> Option<SidebarLink> {
    let caps = SHORT_LINK
        .captures(line)
        .or_else(|| LONG_LINK.captures(line))?;
    Some(SidebarLink {
        raw_code: caps.get(1)?.as_str().to_string(),
        post_slug: caps.get(2)?.as_str().to_string(),
        owner: caps.get(3)?.as_str().to_string(),
    })
}

/// Serial → details, persisted as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&RegistryEntry> {
        self.entries.get(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegistryEntry)> {
        self.entries.iter().map(|(code, entry)| (code.as_str(), entry))
    }

    /// True when the serial is unknown or was recorded without its post.
    pub fn needs_lookup(&self, code: &str) -> bool {
        self.entries
            .get(code)
            .is_none_or(|entry| entry.post_id.is_none())
    }

    /// Insert or complete an entry.
    pub fn record(&mut self, code: impl Into<String>, entry: RegistryEntry) {
        self.entries.insert(code.into(), entry);
    }

    /// Drop malformed and legacy keys (see [`serial::is_purged`]). Returns the
    /// removed keys in sorted order.
    pub fn purge_malformed(&mut self) -> Vec<String> {
        let doomed: Vec<String> = self
            .entries
            .keys()
            .filter(|code| serial::is_purged(code))
            .cloned()
            .collect();
        for code in &doomed {
            self.entries.remove(code);
        }
        doomed
    }
}

impl FromIterator<(String, RegistryEntry)> for Registry {
    fn from_iter<I: IntoIterator<Item = (String, RegistryEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
