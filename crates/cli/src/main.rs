mod config;
mod error;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use runtime::{
    CapabilityGate, ClockTools, Session, SessionConfig, StreamingOrchestrator, ToolModule,
    ToolRouter,
};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::Result;

const CONFIG_FILE: &str = "murmur.toml";

#[derive(Parser)]
#[command(name = "murmur")]
#[command(about = "Streaming voice assistant core, driven from a terminal", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// List the tools the model can be given, by category
    Tools,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)?;
    init_logging(&config.log_level);

    match cli.command {
        Some(Commands::Chat) | None => cmd_chat(&config, &cli.config).await,
        Some(Commands::Tools) => cmd_tools(&config),
    }
}

/// Logs go to stderr so stdout stays the conversation.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();
}

fn router() -> Arc<ToolRouter> {
    Arc::new(ToolRouter::new(vec![
        Arc::new(ClockTools::new()) as Arc<dyn ToolModule>,
    ]))
}

async fn cmd_chat(config: &Config, config_path: &Path) -> Result<()> {
    println!("murmur v{}", env!("CARGO_PKG_VERSION"));

    let api_key = config.api_key()?;
    let router = router();
    let gate = CapabilityGate::new(config.policy(), Arc::clone(&router))?;
    let orchestrator = StreamingOrchestrator::new(config.orchestrator());
    let session_config = SessionConfig::new(config.provider.kind, config.model(), api_key)
        .with_system(config.system_prompt.clone())
        .with_max_rounds(config.tools.max_rounds);
    let mut session = Session::new(orchestrator, router, gate, session_config);

    println!(
        "Config: {}",
        if config_path.exists() {
            config_path.display().to_string()
        } else {
            "default".to_string()
        }
    );
    println!("Provider: {} ({})", config.provider.kind, config.model());
    println!("Type 'quit' or Ctrl+D to exit. Ctrl+C interrupts a reply.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        // Sentences are printed as they arrive, standing in for speech.
        let mut speak = |sentence: &str| println!("{sentence}");
        let outcome = tokio::select! {
            outcome = session.chat(input, &mut speak) => Some(outcome),
            _ = tokio::signal::ctrl_c() => None,
        };
        match outcome {
            Some(Ok(_)) => println!(),
            Some(Err(e)) if e.is_cancelled() => println!(),
            Some(Err(e)) => eprintln!("Error: {e}\n"),
            None => {
                session.interrupt();
                println!("\n(interrupted)\n");
            }
        }
    }

    println!("\nSession ended.");
    Ok(())
}

fn cmd_tools(config: &Config) -> Result<()> {
    let gate = CapabilityGate::new(config.policy(), router())?;
    let baseline = config.policy().baseline;

    for (category, tools) in gate.tool_catalog_by_category() {
        println!("{category}");
        for tool in tools {
            let marker = if baseline.contains(&tool.name) { "*" } else { " " };
            println!("  {marker} {:<24} {}", tool.name, tool.description);
        }
    }
    println!(
        "\n* exposed by default; others can be enabled for {} minutes",
        gate.ttl().num_minutes()
    );
    Ok(())
}
