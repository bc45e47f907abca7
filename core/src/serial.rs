//! Serial code normalization and validation.
//!
//! Serials look like `<Lineage>.<Number>` (`V1.056`, `V2.4`, `VK.12`). The
//! sidebar still carries legacy spellings without the lineage dot, which are
//! rewritten before they reach the registry.

use std::fmt;

/// Rewrite legacy serial spellings into `<Lineage>.<Number>` form.
///
/// - `VK12` becomes `VK.12`
/// - `V056` becomes `V1.056` (pre-lineage serials all belong to V1)
/// - anything whose third character is already `.` is returned unchanged
pub fn normalize(code: &str) -> String {
    if let Some(rest) = code.strip_prefix("VK") {
        if rest.starts_with('.') {
            return code.to_string();
        }
        return format!("VK.{rest}");
    }
    if let Some(rest) = code.strip_prefix('V')
        && code.chars().nth(2) != Some('.')
    {
        return format!("V1.{rest}");
    }
    code.to_string()
}

/// Whether a registry key is a malformed or legacy artifact that must not be
/// persisted.
///
/// Removed keys:
/// - `V1.K...` (a `VK` serial that went through the V1 rewrite)
/// - `V...` keys whose third character is not `.` (too short counts too)
/// - keys with exactly three dot-separated segments (`V1.056.1`)
pub fn is_purged(code: &str) -> bool {
    if code.starts_with("V1.K") {
        return true;
    }
    if code.starts_with('V') && code.chars().nth(2) != Some('.') {
        return true;
    }
    code.split('.').count() == 3
}

/// A serial split into lineage and number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialCode {
    pub lineage: String,
    pub number: u64,
}

impl SerialCode {
    /// Parse `V2.1234` into (`V2`, 1234). Returns `None` for anything that is
    /// not exactly two segments with a numeric tail.
    pub fn parse(code: &str) -> Option<Self> {
        let (lineage, number) = code.split_once('.')?;
        if lineage.is_empty() || number.contains('.') {
            return None;
        }
        let number = number.parse().ok()?;
        Some(Self {
            lineage: lineage.to_string(),
            number,
        })
    }

    /// The serial that follows this one in the same lineage.
    pub fn next(&self) -> Self {
        Self {
            lineage: self.lineage.clone(),
            number: self.number + 1,
        }
    }
}

impl fmt::Display for SerialCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.lineage, self.number)
    }
}

/// Whether `code` belongs to `lineage` (`V2.17` belongs to `V2`).
pub fn in_lineage(code: &str, lineage: &str) -> bool {
    code.strip_prefix(lineage)
        .is_some_and(|rest| rest.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn legacy_v1_serial_gains_lineage() {
        assert_eq!(normalize("V056"), "V1.056");
        assert_eq!(normalize("V5"), "V1.5");
    }

    #[test]
    fn vk_serial_gains_dot() {
        assert_eq!(normalize("VK12"), "VK.12");
        assert_eq!(normalize("VK.12"), "VK.12");
    }

    #[test]
    fn dotted_serials_are_untouched() {
        assert_eq!(normalize("V2.4"), "V2.4");
        assert_eq!(normalize("V0.123"), "V0.123");
        assert_eq!(normalize("V1.056"), "V1.056");
    }

    #[test]
    fn normalization_is_idempotent() {
        for code in ["V056", "VK12", "V2.4", "V0.1"] {
            let once = normalize(code);
            assert_eq!(normalize(&once), once, "{code}");
        }
    }

    #[test]
    fn purge_rule() {
        assert!(is_purged("V1.056.1"));
        assert!(is_purged("V2.4.1"));
        assert!(is_purged("V056"));
        assert!(is_purged("V1.K12"));
        assert!(is_purged("V"));
        assert!(!is_purged("V1.056"));
        assert!(!is_purged("VK.12"));
        assert!(!is_purged("V2.4"));
        assert!(!is_purged("T0.3"));
    }

    #[test]
    fn parse_and_advance() {
        let code = SerialCode::parse("V2.11").unwrap();
        assert_eq!(code.lineage, "V2");
        assert_eq!(code.number, 11);
        assert_eq!(code.next().to_string(), "V2.12");
        assert_eq!(SerialCode::parse("V2.4.1"), None);
        assert_eq!(SerialCode::parse("V2"), None);
        assert_eq!(SerialCode::parse("V2.x"), None);
    }

    #[test]
    fn lineage_membership() {
        assert!(in_lineage("V2.17", "V2"));
        assert!(!in_lineage("V21.3", "V2"));
        assert!(!in_lineage("V1.056", "V2"));
    }
}
