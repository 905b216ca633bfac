//! Falcon CLI: the main entry point.
//!
//! Commands:
//! - `onboard`  - Write a default config file
//! - `serve`    - Start the HTTP gateway for a front-end
//! - `chat`     - Interactive console or single-message mode
//! - `memory`   - Inspect and edit stored conversations and notes
//! - `status`   - Show configuration summary

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "falcon",
    about = "Falcon - conversational assistant with long-term memory and speech",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Onboard,

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Do not speak answers aloud
        #[arg(long)]
        no_speech: bool,

        /// Keep memory in this process only
        #[arg(long)]
        ephemeral: bool,
    },

    /// Inspect and edit memory
    Memory {
        #[command(subcommand)]
        action: commands::memory::MemoryAction,
    },

    /// Show configuration summary
    Status,
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

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Serve { port, host } => commands::serve::run(port, host).await?,
        Commands::Chat {
            message,
            no_speech,
            ephemeral,
        } => commands::chat::run(message, no_speech, ephemeral).await?,
        Commands::Memory { action } => commands::memory::run(action).await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
