mod config;
mod handlers;
mod models;
#[cfg(feature = "relay-server")]
mod server;
mod services;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use config::Config;
use handlers::{AssistantHandler, Conversation, ScanPipeline, ScanSession, ScanState};
use models::AnalysisOutcome;
use services::{CompletionProvider, GroqClient, HttpRelayClient, ProviderRelay, RelayClient};

#[derive(Parser)]
#[command(name = "nutriscan", version, about = "AI food scanner: relay server and analysis pipeline")]
struct Cli {
    /// Relay endpoint used by `scan` and `chat`
    #[arg(long, global = true, env = "RELAY_URL")]
    relay_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay HTTP server
    #[cfg(feature = "relay-server")]
    Serve {
        /// Bind address, e.g. 0.0.0.0:3001
        #[arg(long)]
        addr: Option<String>,
    },
    /// Classify a food description and estimate its nutrition
    Scan {
        description: String,
        /// Call the upstream provider directly instead of the relay
        #[arg(long)]
        direct: bool,
    },
    /// Chat with the nutrition assistant (/scan <item> to scan, /history to replay, exit to quit)
    Chat {
        /// Item to tailor advice to, e.g. the last scanned food
        #[arg(long)]
        context: Option<String>,
        #[arg(long)]
        direct: bool,
    },
    /// Body mass index from height and weight
    Bmi {
        #[arg(long)]
        height_cm: f64,
        #[arg(long)]
        weight_kg: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before anything reads them
    dotenv().ok();

    // Initialize logger
    env_logger::init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(url) = cli.relay_url {
        config.relay_url = url;
    }

    match cli.command {
        #[cfg(feature = "relay-server")]
        Command::Serve { addr } => {
            if let Some(addr) = addr {
                config.relay_addr = addr;
            }
            log::info!("🚀 Starting nutriscan relay server...");
            server::serve(&config).await
        }
        Command::Scan { description, direct } => {
            let pipeline = ScanPipeline::new(relay_client(&config, direct)?, config.timeout);
            run_scan(&pipeline, &description).await
        }
        Command::Chat { context, direct } => run_chat(&config, context, direct).await,
        Command::Bmi { height_cm, weight_kg } => {
            let report = services::bmi::calculate(height_cm, weight_kg)?;
            println!("BMI: {:.1} ({})", report.bmi, report.category);
            println!("{}", report.advice);
            Ok(())
        }
    }
}

fn relay_client(config: &Config, direct: bool) -> Result<Arc<dyn RelayClient>> {
    if direct {
        let key = config.require_api_key()?;
        let groq = GroqClient::from_config(config, key);
        log::info!("✅ Calling Groq directly with model: {}", groq.model());
        let groq: Arc<dyn CompletionProvider> = Arc::new(groq);
        Ok(Arc::new(ProviderRelay::new(Some(groq))))
    } else {
        log::info!("✅ Using relay at {}", config.relay_url);
        Ok(Arc::new(HttpRelayClient::new(config.relay_url.clone(), config.timeout)))
    }
}

async fn run_scan(pipeline: &ScanPipeline, description: &str) -> Result<()> {
    let outcome = pipeline.classify_and_analyze(description).await;
    println!("{}", outcome.user_message());

    if let AnalysisOutcome::Error(e) = outcome {
        anyhow::bail!("analysis of {:?} failed: {}", description, e);
    }
    Ok(())
}

async fn run_chat(config: &Config, context: Option<String>, direct: bool) -> Result<()> {
    let relay = relay_client(config, direct)?;
    let assistant = AssistantHandler::new(relay.clone(), config.timeout);
    let pipeline = ScanPipeline::new(relay, config.timeout);

    let mut session = ScanSession::new();
    let mut conversation = Conversation::new();
    let mut context = context;

    println!("{}", Conversation::greeting().content);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "exit" || line == "quit" {
            break;
        }

        if line == "/history" {
            if conversation.is_empty() {
                println!("(no messages yet)");
            }
            for message in conversation.messages() {
                println!("[{:?}] {}", message.role, message.content);
            }
            continue;
        }

        if let Some(item) = line.strip_prefix("/scan ") {
            if *session.state() != ScanState::Idle {
                session.reset();
            }
            let outcome = session
                .run(&pipeline, item.trim(), |state| match state {
                    ScanState::Validating => println!("🔍 Checking that this is food..."),
                    ScanState::Analyzing => println!("🥗 Estimating nutrition..."),
                    _ => {}
                })
                .await?;
            println!("{}", outcome.user_message());
            if let Some(last) = session.last_scanned() {
                context = Some(last.to_string());
            }
            continue;
        }

        if let Some(reply) = conversation.send(&assistant, line, context.as_deref()).await {
            println!("{}", reply.content);
        }
    }

    log::info!("👋 Chat ended after {} messages", conversation.len());
    Ok(())
}
