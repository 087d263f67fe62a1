//! Main entry point for the chapter translation CLI

#![forbid(unsafe_code)]

use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod core;

use cli::commands::Commands;

/// Streaming multi-provider chapter translator
#[derive(Parser, Debug)]
#[command(name = "chapter-translator", version, about, long_about = None)]
struct Args {
    /// Path to a JSON configuration file (defaults to environment variables)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("chapter_translator={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Execute command
    match args.command {
        Some(Commands::Translate {
            input,
            output,
            model,
            prompt_file,
            temperature,
            thinking_budget,
        }) => {
            cli::commands::handle_translate(
                args.config,
                input,
                output,
                model,
                prompt_file,
                temperature,
                thinking_budget,
            )
            .await?;
        }
        Some(Commands::Usage) => {
            cli::commands::handle_usage(args.config).await?;
        }
        Some(Commands::Models) => {
            cli::commands::handle_models().await?;
        }
        None => {
            println!("Please specify a command. Use --help for more information.");
        }
    }

    Ok(())
}
