mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Detect, translate, and summarize chat messages", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration
    Onboard {
        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Show configuration and capability readiness
    Status,

    /// Run the pipeline once on a message
    Process {
        /// Message text
        text: String,

        /// Translate the message into this language code
        #[arg(short, long)]
        translate: Option<String>,

        /// Summarize the message if it is long enough
        #[arg(short, long)]
        summarize: bool,

        /// Print outcomes as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive chat session
    Chat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing; stdout carries the conversation, logs go to stderr
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Onboard { force } => {
            commands::onboard::run(force).await?;
        }
        Commands::Status => {
            commands::status::run().await?;
        }
        Commands::Process {
            text,
            translate,
            summarize,
            json,
        } => {
            commands::process::run(&text, translate.as_deref(), summarize, json).await?;
        }
        Commands::Chat => {
            commands::chat::run().await?;
        }
    }

    Ok(())
}
