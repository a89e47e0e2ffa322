//! emissary CLI — the main entry point.
//!
//! Commands:
//! - `init`   — Write a starter config file
//! - `serve`  — Start the HTTP gateway with the embedded chat widget
//! - `chat`   — Talk to the persona from the terminal
//! - `prompt` — Print the assembled system prompt

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "emissary",
    about = "emissary — a personal career chatbot",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file
    #[arg(short, long, global = true, default_value = "emissary.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter emissary.toml
    Init,

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the persona from the terminal
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Print the assembled system prompt
    Prompt,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = emissary_config::AppConfig::load_path(&cli.config)?;

    match cli.command {
        Commands::Init => commands::init::run(&cli.config)?,
        Commands::Serve { port } => commands::serve::run(config, port).await?,
        Commands::Chat { message } => commands::chat::run(config, message).await?,
        Commands::Prompt => commands::prompt::run(config)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
