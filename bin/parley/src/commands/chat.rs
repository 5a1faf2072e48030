use parley_agent::Orchestrator;
use parley_core::{ConversationTurn, Error, PipelineOutcome, SystemTurnKind, TurnId};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{build_orchestrator, interruptible, render_outcome, spawn_progress_printer};

const HELP: &str = "\
Commands:
  /translate [lang]   Translate the last message (default: selected target)
  /lang <code>        Select the translation target
  /summarize [turn]   Summarize a long message (default: latest offered)
  /languages          List supported languages
  /log                Show the conversation so far
  /help               Show this help
  /quit               Exit
Anything else is sent as a message. Ctrl-C cancels a running step.";

enum Command<'a> {
    Message(&'a str),
    Translate(Option<&'a str>),
    Lang(Option<&'a str>),
    Summarize(Option<&'a str>),
    Languages,
    Log,
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse(line: &str) -> Command<'_> {
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Message(line);
    };
    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or("");
    let arg = parts.next();
    match name {
        "translate" | "t" => Command::Translate(arg),
        "lang" => Command::Lang(arg),
        "summarize" | "s" => Command::Summarize(arg),
        "languages" => Command::Languages,
        "log" => Command::Log,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => Command::Unknown(other),
    }
}

fn print_outcome(orchestrator: &Orchestrator, outcome: &PipelineOutcome) {
    if let Some(line) = render_outcome(orchestrator, outcome) {
        println!("  {}", line);
    }
}

fn print_log(orchestrator: &Orchestrator) {
    let log = orchestrator.log();
    if log.is_empty() {
        println!("  (empty)");
        return;
    }
    for turn in log.turns() {
        match turn {
            ConversationTurn::User { id, text, .. } => println!("{:>4} you: {}", id, text),
            ConversationTurn::System {
                id,
                text,
                kind,
                related,
                offers_summarization,
                ..
            } => {
                let marker = match kind {
                    SystemTurnKind::Info => "·",
                    SystemTurnKind::Error => "✗",
                };
                let rel = related.map(|r| format!(" (re {})", r)).unwrap_or_default();
                let offer = if *offers_summarization { " [summary available]" } else { "" };
                println!("{:>4} {} {}{}{}", id, marker, text, rel, offer);
            }
        }
    }
}

fn report_error(e: Error) {
    match e {
        Error::Busy => println!("  Still working on the previous message."),
        other => println!("  {}", other),
    }
}

pub async fn run() -> anyhow::Result<()> {
    let (orchestrator, events) = build_orchestrator()?;
    let _printer = spawn_progress_printer(events, false);

    println!("parley chat. Target language: {}. Type /help for commands.", orchestrator.target_language());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match parse(line.trim()) {
            Command::Message(text) => {
                match interruptible(&orchestrator, orchestrator.process(text)).await {
                    Ok(outcomes) => outcomes.iter().for_each(|o| print_outcome(&orchestrator, o)),
                    Err(e) => report_error(e),
                }
            }
            Command::Translate(lang) => {
                let target = lang
                    .map(|l| l.to_lowercase())
                    .unwrap_or_else(|| orchestrator.target_language());
                match interruptible(&orchestrator, orchestrator.translate(&target)).await {
                    Ok(outcome) => print_outcome(&orchestrator, &outcome),
                    Err(e) => report_error(e),
                }
            }
            Command::Lang(None) => println!("  Target language: {}", orchestrator.target_language()),
            Command::Lang(Some(code)) => match orchestrator.set_target_language(code) {
                Ok(()) => println!("  Target language: {}", orchestrator.target_language()),
                Err(e) => report_error(e),
            },
            Command::Summarize(arg) => {
                let turn = match arg {
                    Some(raw) => match raw.trim_start_matches('#').parse::<u64>() {
                        Ok(n) => Some(TurnId(n)),
                        Err(_) => {
                            println!("  Not a turn number: {}", raw);
                            continue;
                        }
                    },
                    None => orchestrator.latest_offered_turn(),
                };
                let Some(turn) = turn else {
                    println!("  Nothing to summarize yet.");
                    continue;
                };
                match interruptible(&orchestrator, orchestrator.summarize(turn)).await {
                    Ok(outcome) => print_outcome(&orchestrator, &outcome),
                    Err(e) => report_error(e),
                }
            }
            Command::Languages => {
                let current = orchestrator.target_language();
                for lang in &orchestrator.pipeline().languages {
                    let mark = if lang.code == current { "*" } else { " " };
                    println!("  {} {:<3} {}", mark, lang.code, lang.name);
                }
            }
            Command::Log => print_log(&orchestrator),
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
            Command::Unknown(name) => println!("  Unknown command /{}. Type /help.", name),
        }
    }

    Ok(())
}
