use serde::{Deserialize, Serialize};
use std::fmt;

use crate::conversation::TurnId;
use crate::error::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validating,
    Detecting,
    Translating,
    Summarizing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Validating => "validating",
            Stage::Detecting => "detecting",
            Stage::Translating => "translating",
            Stage::Summarizing => "summarizing",
        };
        f.write_str(s)
    }
}

/// Informational reasons a stage did not run. Not failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    CapabilityUnavailable,
    UnsupportedPair,
    SameLanguage,
    TooShort,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::CapabilityUnavailable => "capability unavailable",
            SkipReason::UnsupportedPair => "language pair not supported",
            SkipReason::SameLanguage => "source and target language are the same",
            SkipReason::TooShort => "text too short",
        };
        f.write_str(s)
    }
}

/// Reasons a stage failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    EmptyInput,
    ProvisioningFailed { cause: String },
    DetectionFailed { cause: String },
    TranslationFailed { cause: String },
    SummarizationFailed { cause: String },
    Cancelled,
}

impl FailureKind {
    /// Map an error raised inside a stage onto the outcome taxonomy.
    pub fn from_error(stage: Stage, err: &Error) -> Self {
        match err {
            Error::Cancelled => FailureKind::Cancelled,
            Error::ProvisioningFailed { cause, .. } => FailureKind::ProvisioningFailed {
                cause: cause.clone(),
            },
            Error::CapabilityUnavailable(_) => FailureKind::ProvisioningFailed {
                cause: err.to_string(),
            },
            Error::DetectionFailed(cause) => FailureKind::DetectionFailed { cause: cause.clone() },
            Error::TranslationFailed(cause) => FailureKind::TranslationFailed { cause: cause.clone() },
            Error::SummarizationFailed(cause) => FailureKind::SummarizationFailed {
                cause: cause.clone(),
            },
            other => {
                let cause = other.to_string();
                match stage {
                    Stage::Validating => FailureKind::EmptyInput,
                    Stage::Detecting => FailureKind::DetectionFailed { cause },
                    Stage::Translating => FailureKind::TranslationFailed { cause },
                    Stage::Summarizing => FailureKind::SummarizationFailed { cause },
                }
            }
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::EmptyInput => write!(f, "empty input"),
            FailureKind::ProvisioningFailed { cause } => write!(f, "provisioning failed: {}", cause),
            FailureKind::DetectionFailed { cause } => write!(f, "detection failed: {}", cause),
            FailureKind::TranslationFailed { cause } => write!(f, "translation failed: {}", cause),
            FailureKind::SummarizationFailed { cause } => {
                write!(f, "summarization failed: {}", cause)
            }
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One entry of the ordered result stream produced by a pipeline action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Detected { language: String },
    Translated { from: String, to: String, text: String },
    /// The length branch made a summarization offer for this user turn.
    SummaryOffered { turn: TurnId },
    Summarized { text: String },
    Skipped { stage: Stage, reason: SkipReason },
    Failed { stage: Stage, error: FailureKind },
}

impl PipelineOutcome {
    pub fn skipped(stage: Stage, reason: SkipReason) -> Self {
        PipelineOutcome::Skipped { stage, reason }
    }

    pub fn failed(stage: Stage, error: FailureKind) -> Self {
        PipelineOutcome::Failed { stage, error }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, PipelineOutcome::Failed { .. })
    }

    /// Coarse classification, stable across reruns of the same input.
    pub fn classification(&self) -> String {
        match self {
            PipelineOutcome::Detected { .. } => "detected".to_string(),
            PipelineOutcome::Translated { .. } => "translated".to_string(),
            PipelineOutcome::SummaryOffered { .. } => "summary_offered".to_string(),
            PipelineOutcome::Summarized { .. } => "summarized".to_string(),
            PipelineOutcome::Skipped { stage, reason } => format!("skipped:{}:{:?}", stage, reason),
            PipelineOutcome::Failed { stage, error } => {
                let kind = match error {
                    FailureKind::EmptyInput => "empty_input",
                    FailureKind::ProvisioningFailed { .. } => "provisioning_failed",
                    FailureKind::DetectionFailed { .. } => "detection_failed",
                    FailureKind::TranslationFailed { .. } => "translation_failed",
                    FailureKind::SummarizationFailed { .. } => "summarization_failed",
                    FailureKind::Cancelled => "cancelled",
                };
                format!("failed:{}:{}", stage, kind)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;

    #[test]
    fn test_failure_from_error() {
        let err = Error::provisioning(Capability::Translation, "model pull failed");
        assert_eq!(
            FailureKind::from_error(Stage::Translating, &err),
            FailureKind::ProvisioningFailed { cause: "model pull failed".to_string() }
        );
        assert_eq!(
            FailureKind::from_error(Stage::Detecting, &Error::Cancelled),
            FailureKind::Cancelled
        );
        let provider = Error::Provider("HTTP 503".to_string());
        assert!(matches!(
            FailureKind::from_error(Stage::Summarizing, &provider),
            FailureKind::SummarizationFailed { .. }
        ));
        assert!(matches!(
            FailureKind::from_error(
                Stage::Detecting,
                &Error::CapabilityUnavailable(Capability::Detection)
            ),
            FailureKind::ProvisioningFailed { .. }
        ));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = PipelineOutcome::skipped(Stage::Translating, SkipReason::SameLanguage);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["stage"], "translating");
        assert_eq!(json["reason"], "same_language");

        let failed = PipelineOutcome::failed(Stage::Validating, FailureKind::EmptyInput);
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["error"]["kind"], "empty_input");
        assert!(failed.is_failure());
    }

    #[test]
    fn test_classification_ignores_causes() {
        let a = PipelineOutcome::failed(
            Stage::Detecting,
            FailureKind::DetectionFailed { cause: "timeout after 10s".to_string() },
        );
        let b = PipelineOutcome::failed(
            Stage::Detecting,
            FailureKind::DetectionFailed { cause: "timeout after 11s".to_string() },
        );
        assert_eq!(a.classification(), b.classification());
    }
}
