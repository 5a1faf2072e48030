use serde::{Deserialize, Serialize};
use std::fmt;

/// Source language used when detection was skipped or failed.
pub const AUTO_LANGUAGE: &str = "auto";

/// The three environment-backed operations a session can use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Detection,
    Translation,
    Summarization,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::Detection,
        Capability::Translation,
        Capability::Summarization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Detection => "detection",
            Capability::Translation => "translation",
            Capability::Summarization => "summarization",
        }
    }

    /// Noun used in progress lines ("Downloading detector: ...").
    pub fn handle_name(&self) -> &'static str {
        match self {
            Capability::Detection => "detector",
            Capability::Translation => "translator",
            Capability::Summarization => "summarizer",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state readiness signal.
///
/// "Exists" and "usable now" are different things: a capability may be present
/// but need a one-time download before a handle can be created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Unavailable,
    ReadyImmediate,
    ReadyAfterProvision,
}

impl Readiness {
    pub fn is_usable(&self) -> bool {
        !matches!(self, Readiness::Unavailable)
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Readiness::Unavailable => "unavailable",
            Readiness::ReadyImmediate => "ready",
            Readiness::ReadyAfterProvision => "ready after download",
        };
        f.write_str(s)
    }
}

/// Whether a translator can be created for a given source → target pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PairSupport {
    Yes,
    No,
    Unknown,
}

impl PairSupport {
    /// `Unknown` is never attempted.
    pub fn is_supported(&self) -> bool {
        matches!(self, PairSupport::Yes)
    }
}

/// Summarizer creation options, mirroring the knobs on-device summarizers expose.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SummarizerOptions {
    #[serde(rename = "type", default = "default_summary_type")]
    pub summary_type: String,
    #[serde(default = "default_summary_format")]
    pub format: String,
    #[serde(default = "default_summary_length")]
    pub length: String,
    #[serde(default)]
    pub shared_context: Option<String>,
}

fn default_summary_type() -> String {
    "key-points".to_string()
}

fn default_summary_format() -> String {
    "plain-text".to_string()
}

fn default_summary_length() -> String {
    "medium".to_string()
}

impl Default for SummarizerOptions {
    fn default() -> Self {
        Self {
            summary_type: default_summary_type(),
            format: default_summary_format(),
            length: default_summary_length(),
            shared_context: None,
        }
    }
}

/// What to materialize. Translators are bound to one pair at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "capability", rename_all = "snake_case")]
pub enum ProvisionRequest {
    Detection,
    Translation { source: String, target: String },
    Summarization(SummarizerOptions),
}

impl ProvisionRequest {
    pub fn capability(&self) -> Capability {
        match self {
            ProvisionRequest::Detection => Capability::Detection,
            ProvisionRequest::Translation { .. } => Capability::Translation,
            ProvisionRequest::Summarization(_) => Capability::Summarization,
        }
    }
}

/// Reduce a detector answer to a lowercase primary subtag ("EN-us" → "en").
/// Returns `None` unless the subtag is 2-3 ASCII letters.
pub fn normalize_language_code(raw: &str) -> Option<String> {
    let primary = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '`')
        .split(|c: char| c == '-' || c == '_')
        .next()?
        .to_ascii_lowercase();
    let len = primary.len();
    if (2..=3).contains(&len) && primary.chars().all(|c| c.is_ascii_lowercase()) {
        Some(primary)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_language_code() {
        assert_eq!(normalize_language_code("en").as_deref(), Some("en"));
        assert_eq!(normalize_language_code("EN-us").as_deref(), Some("en"));
        assert_eq!(normalize_language_code(" pt_BR\n").as_deref(), Some("pt"));
        assert_eq!(normalize_language_code("\"fr\".").as_deref(), Some("fr"));
        assert_eq!(normalize_language_code("fil").as_deref(), Some("fil"));
        assert_eq!(normalize_language_code("English"), None);
        assert_eq!(normalize_language_code("e"), None);
        assert_eq!(normalize_language_code(""), None);
        assert_eq!(normalize_language_code("z9"), None);
    }

    #[test]
    fn test_unknown_pair_is_not_supported() {
        assert!(PairSupport::Yes.is_supported());
        assert!(!PairSupport::No.is_supported());
        assert!(!PairSupport::Unknown.is_supported());
    }

    #[test]
    fn test_provision_request_capability() {
        assert_eq!(ProvisionRequest::Detection.capability(), Capability::Detection);
        let req = ProvisionRequest::Translation {
            source: "en".to_string(),
            target: "es".to_string(),
        };
        assert_eq!(req.capability(), Capability::Translation);
        assert_eq!(
            ProvisionRequest::Summarization(SummarizerOptions::default()).capability(),
            Capability::Summarization
        );
    }

    #[test]
    fn test_summarizer_options_serde_names() {
        let raw = r#"{"type": "tl;dr", "length": "short"}"#;
        let opts: SummarizerOptions = serde_json::from_str(raw).unwrap();
        assert_eq!(opts.summary_type, "tl;dr");
        assert_eq!(opts.format, "plain-text");
        assert_eq!(opts.length, "short");
        assert!(opts.shared_context.is_none());
    }
}
