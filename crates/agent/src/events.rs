use parley_core::{CapabilityProgress, PipelineOutcome, Stage, TurnId};
use serde::Serialize;
use tokio::sync::mpsc;

/// What a running pipeline reports while it works. Progress arrives before the outcome
/// of the stage that produced it.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageStarted {
        stage: Stage,
        turn: Option<TurnId>,
    },
    Progress(CapabilityProgress),
    Outcome {
        turn: Option<TurnId>,
        outcome: PipelineOutcome,
    },
}

pub type EventSender = mpsc::UnboundedSender<PipelineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
