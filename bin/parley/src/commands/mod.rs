pub mod chat;
pub mod onboard;
pub mod process;
pub mod status;

use parley_agent::{event_channel, EventReceiver, Orchestrator, PipelineEvent};
use parley_core::{Config, FailureKind, Paths, PipelineOutcome, SkipReason, Stage};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Load config and build an orchestrator over the configured backend.
pub fn build_orchestrator() -> anyhow::Result<(Arc<Orchestrator>, EventReceiver)> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let provider = parley_providers::create_provider(&config)?;
    let (tx, rx) = event_channel();
    let orchestrator = Orchestrator::new(provider, config.pipeline).with_events(tx);
    Ok((Arc::new(orchestrator), rx))
}

/// Print download progress lines as they arrive.
pub fn spawn_progress_printer(mut rx: EventReceiver, to_stderr: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let PipelineEvent::Progress(p) = event {
                let line = format!(
                    "Downloading {}: {}/{} bytes",
                    p.capability.handle_name(),
                    p.event.bytes_loaded,
                    p.event.bytes_total
                );
                if to_stderr {
                    eprintln!("{}", line);
                } else {
                    println!("{}", line);
                }
            }
        }
    })
}

/// Await `fut`; Ctrl-C while it runs cancels the active pipeline run instead of exiting.
pub async fn interruptible<T>(orchestrator: &Orchestrator, fut: impl Future<Output = T>) -> T {
    tokio::pin!(fut);
    tokio::select! {
        out = &mut fut => return out,
        _ = tokio::signal::ctrl_c() => {}
    }
    orchestrator.cancel();
    fut.await
}

/// One display line per outcome. `None` for outcomes not worth showing in a chat.
pub fn render_outcome(orchestrator: &Orchestrator, outcome: &PipelineOutcome) -> Option<String> {
    let pipeline = orchestrator.pipeline();
    let line = match outcome {
        PipelineOutcome::Detected { language } => {
            format!("Detected language: {} ({})", language, pipeline.language_name(language))
        }
        PipelineOutcome::Translated { to, text, .. } => {
            format!("Translated to {}: {}", pipeline.language_name(to), text)
        }
        PipelineOutcome::SummaryOffered { turn } => {
            format!("Long message. Type /summarize {} for a summary.", turn.0)
        }
        PipelineOutcome::Summarized { text } => format!("Summary: {}", text),
        PipelineOutcome::Skipped {
            stage: Stage::Summarizing,
            reason: SkipReason::TooShort,
        } => return None,
        PipelineOutcome::Skipped { stage, reason } => format!("({} skipped: {})", stage, reason),
        PipelineOutcome::Failed { stage, error } => match error {
            FailureKind::EmptyInput => "Please enter some text!".to_string(),
            FailureKind::Cancelled => format!("✗ {} cancelled", stage),
            FailureKind::ProvisioningFailed { .. } => format!("✗ {}: {}", stage, error),
            other => format!("✗ {}", other),
        },
    };
    Some(line)
}
