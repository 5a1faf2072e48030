use parley_core::PipelineOutcome;

use super::{build_orchestrator, interruptible, spawn_progress_printer};

pub async fn run(
    text: &str,
    translate: Option<&str>,
    summarize: bool,
    json: bool,
) -> anyhow::Result<()> {
    let (orchestrator, events) = build_orchestrator()?;
    let printer = spawn_progress_printer(events, json);

    let mut outcomes = interruptible(&orchestrator, orchestrator.process(text)).await?;
    let turn = orchestrator.log().last_user_turn();

    if let Some(turn) = turn {
        if let Some(target) = translate {
            outcomes.push(interruptible(&orchestrator, orchestrator.translate(target)).await?);
        }
        if summarize {
            outcomes.push(interruptible(&orchestrator, orchestrator.summarize(turn)).await?);
        }
    }

    // Close the event stream so the printer drains and exits.
    drop(orchestrator);
    let _ = printer.await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        print_outcomes(&outcomes);
    }

    if outcomes.iter().any(PipelineOutcome::is_failure) {
        std::process::exit(1);
    }
    Ok(())
}

fn print_outcomes(outcomes: &[PipelineOutcome]) {
    for outcome in outcomes {
        match outcome {
            PipelineOutcome::Detected { language } => println!("language:   {}", language),
            PipelineOutcome::Translated { from, to, text } => {
                println!("translated: {} → {}", from, to);
                println!("  {}", text);
            }
            PipelineOutcome::SummaryOffered { .. } => {
                println!("summary:    available (rerun with --summarize)")
            }
            PipelineOutcome::Summarized { text } => {
                println!("summary:");
                println!("  {}", text);
            }
            PipelineOutcome::Skipped { stage, reason } => println!("skipped:    {} ({})", stage, reason),
            PipelineOutcome::Failed { stage, error } => println!("failed:     {} ({})", stage, error),
        }
    }
}
