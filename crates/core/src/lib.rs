pub mod capability;
pub mod config;
pub mod conversation;
pub mod error;
pub mod outcome;
pub mod paths;
pub mod progress;

pub use capability::{
    normalize_language_code, Capability, PairSupport, ProvisionRequest, Readiness,
    SummarizerOptions, AUTO_LANGUAGE,
};
pub use config::{Config, LengthMetric, PipelineConfig, TranslationMode};
pub use conversation::{ConversationLog, ConversationTurn, SystemTurnKind, TurnId};
pub use error::{Error, Result};
pub use outcome::{FailureKind, PipelineOutcome, SkipReason, Stage};
pub use paths::Paths;
pub use progress::{CapabilityProgress, ProgressEvent, ProgressReporter};
