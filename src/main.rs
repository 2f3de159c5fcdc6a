// src/main.rs
// Vega - autonomous agent runtime

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vega_backend::config::AgentConfig;
use vega_backend::runtime::Runtime;

#[derive(Parser)]
#[command(name = "vega", about = "Autonomous agent runtime", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Boot the runtime: scheduler plus an interactive prompt on stdin
    Run,
    /// Print the status probe of a freshly constructed runtime and exit
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AgentConfig::from_env()?;

    match cli.command {
        Command::Run => run(config).await,
        Command::Status => status(config).await,
    }
}

async fn run(config: AgentConfig) -> Result<()> {
    let runtime = Runtime::new(config).await?;
    runtime.start_scheduler();
    info!("Runtime ready; type a message (ctrl-d to exit)");

    // Tool activity feed
    {
        let mut events = runtime.subscribe_events();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let vega_backend::events::ToolEvent::Start { label, .. } = event {
                    eprintln!("  » {}", label);
                }
            }
        });
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    print!("> ");
    std::io::stdout().flush().ok();
    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if message.is_empty() {
            print!("> ");
            std::io::stdout().flush().ok();
            continue;
        }
        if message == "exit" || message == "quit" {
            break;
        }

        let on_token = Arc::new(|token: &str| {
            print!("{}", token);
            std::io::stdout().flush().ok();
        });
        let result = runtime.chat(message, Some(on_token)).await;
        match result.status {
            vega_backend::queue::TaskStatus::Completed => {
                // Streaming already printed the tokens; terminate the line.
                println!();
            }
            vega_backend::queue::TaskStatus::Failed => {
                println!("Error: {}", result.error.unwrap_or_default());
            }
        }
        print!("> ");
        std::io::stdout().flush().ok();
    }

    runtime.shutdown().await;
    Ok(())
}

async fn status(config: AgentConfig) -> Result<()> {
    let runtime = Runtime::new(config).await?;
    let probe = runtime.status().await;
    println!("{}", serde_json::to_string_pretty(&probe)?);
    Ok(())
}
