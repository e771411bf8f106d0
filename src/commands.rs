use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use crate::chat::{ChatClient, ChatOrchestrator, ChatSession, QuickAction};
use crate::config::Config;
use crate::console::{CommandConsole, RobotStatus};
use crate::database::VectorIndex;
use crate::embeddings::{EmbeddingClient, TextChunker};
use crate::provider::ProviderClient;
use crate::retrieval::RetrievalBridge;

/// Open the knowledge base described by `config`
#[inline]
pub async fn open_bridge(config: &Config) -> Result<RetrievalBridge<EmbeddingClient>> {
    let provider =
        ProviderClient::new(&config.provider).context("Failed to initialize provider client")?;
    let embedder = EmbeddingClient::from_provider(provider, &config.provider);
    let chunker = TextChunker::new(&config.chunking).context("Invalid chunking configuration")?;
    let index = VectorIndex::open(config.vector_database_path())
        .await
        .context("Failed to open vector index")?;

    Ok(RetrievalBridge::new(
        embedder,
        index,
        chunker,
        config.retrieval.clone(),
    ))
}

fn spinner(message: &str) -> ProgressBar {
    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Replace the knowledge base with the contents of a plain-text document
#[inline]
pub async fn ingest_document(config_dir: &Path, file: &Path) -> Result<()> {
    let config = Config::load(config_dir)?;
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read document {}", file.display()))?;

    info!("Ingesting {} ({} bytes)", file.display(), text.len());
    let bridge = open_bridge(&config).await?;

    let bar = spinner("Building knowledge base");
    let result = bridge.ingest(&text).await;
    bar.finish_and_clear();

    match result {
        Ok(report) => {
            if report.is_degraded() {
                println!("{}", style(&report).yellow());
            } else {
                println!("{}", style(&report).green());
            }
            Ok(())
        }
        Err(e) => {
            error!("Ingestion of {} failed: {}", file.display(), e);
            println!("{}", style(e.user_message()).red());
            Err(e.into())
        }
    }
}

/// Print the chunks retrieved for a question
#[inline]
pub async fn query_knowledge(
    config_dir: &Path,
    question: &str,
    top_k: Option<usize>,
) -> Result<()> {
    let config = Config::load(config_dir)?;
    let bridge = open_bridge(&config).await?;
    let k = top_k.unwrap_or(config.retrieval.top_k);

    match bridge.search(question, k).await {
        Ok(chunks) if chunks.is_empty() => println!("No matching chunks."),
        Ok(chunks) => {
            for (rank, chunk) in chunks.iter().enumerate() {
                println!("{}", style(format!("#{}", rank + 1)).bold().cyan());
                println!("{}", chunk);
                println!();
            }
        }
        Err(e) => println!("{}", style(e.user_message()).yellow()),
    }

    Ok(())
}

fn print_token(token: &str) {
    print!("{}", token);
    let _ = std::io::stdout().flush();
}

fn read_line(prompt: &str) -> Option<String> {
    Input::<String>::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()
        .ok()
}

/// Interactive maintenance chat with streamed answers
#[inline]
pub async fn run_chat(config_dir: &Path, quick: Option<QuickAction>) -> Result<()> {
    let config = Config::load(config_dir)?;
    let chat_client = ChatClient::new(&config.provider).context("Failed to create chat client")?;
    let bridge = open_bridge(&config).await?;
    let orchestrator = ChatOrchestrator::new(chat_client).with_retrieval(bridge);

    let mut session = ChatSession::default();
    if orchestrator.refresh_readiness(&mut session).await {
        eprintln!("{}", style("📚 Knowledge base loaded").green());
    } else {
        eprintln!(
            "{}",
            style("No knowledge base yet; answers use general knowledge only").yellow()
        );
    }

    if let Some(action) = quick {
        eprintln!("{}", style(format!("⚡ {}", action.label())).bold());
        if let Err(e) = orchestrator
            .quick_action(&mut session, action, print_token)
            .await
        {
            println!();
            println!("{}", style(format!("❌ {}", e)).red());
        }
        println!();
    }

    eprintln!(
        "{}",
        style("Commands: /reset, /quick <servo|plc-timeout|abb-errors|encoder>, /exit").dim()
    );

    while let Some(line) = read_line("You") {
        let line = line.trim();
        match line {
            "" => continue,
            "/exit" | "/quit" => break,
            "/reset" => {
                ChatOrchestrator::<ChatClient, EmbeddingClient>::reset(&mut session);
                eprintln!("{}", style("🗑️ Conversation cleared").dim());
                continue;
            }
            _ => {}
        }

        let result = if let Some(name) = line.strip_prefix("/quick") {
            match <QuickAction as clap::ValueEnum>::from_str(name.trim(), true) {
                Ok(action) => {
                    orchestrator
                        .quick_action(&mut session, action, print_token)
                        .await
                }
                Err(e) => {
                    println!("{}", style(format!("Unknown quick action: {}", e)).yellow());
                    continue;
                }
            }
        } else {
            orchestrator.turn(&mut session, line, print_token).await
        };

        println!();
        if let Err(e) = result {
            println!("{}", style(format!("❌ {}", e)).red());
        }
    }

    Ok(())
}

fn print_fleet(console: &CommandConsole) {
    for robot in console.fleet().robots() {
        let status = match robot.status {
            RobotStatus::Running => style(format!("🟢 {}", robot.status)).green(),
            RobotStatus::Stopped => style(format!("🟡 {}", robot.status)).yellow(),
            RobotStatus::EmergencyStop => style(format!("🚨 {}", robot.status)).red(),
        };
        println!(
            "  🤖 #{}  {}  speed {}%  temp {:.1}°C",
            robot.id, status, robot.speed, robot.temperature
        );
    }
}

/// Natural-language command console for the simulated fleet
#[inline]
pub fn run_console(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir)?;
    let chat_client = ChatClient::new(&config.provider).context("Failed to create chat client")?;
    let mut console = CommandConsole::new(&config.console);

    eprintln!("{}", style("🎮 Robot command console").bold().cyan());
    eprintln!("{}", style("Commands: /status, /clear, /exit").dim());
    print_fleet(&console);

    while let Some(line) = read_line("Command") {
        match line.trim() {
            "" => {}
            "/exit" | "/quit" => break,
            "/status" => print_fleet(&console),
            "/clear" => console.clear(),
            instruction => match console.handle(&chat_client, instruction) {
                Ok(reply) => {
                    println!("{}", reply.text);
                    if reply.executed {
                        print_fleet(&console);
                    }
                }
                Err(e) => println!("{}", style(format!("❌ {}", e)).red()),
            },
        }
    }

    Ok(())
}

/// Show configuration and knowledge base health
#[inline]
pub async fn show_status(config_dir: &Path) -> Result<()> {
    let (config, load_error) = Config::load_or_defaults(config_dir);

    println!("📊 Factory Brain Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("⚙️  Configuration:");
    println!("   📄 File: {}", config.config_file_path().display());
    if let Some(e) = &load_error {
        println!("   ❌ Failed to load ({:#}); showing defaults", e);
    }
    match config.provider.base_url() {
        Ok(url) => println!("   🌐 Provider: {}", url),
        Err(e) => println!("   ❌ Provider: {}", e),
    }
    println!(
        "   📋 Models: chat {} / embedding {} ({} dims)",
        config.provider.chat_model,
        config.provider.embedding_model,
        config.provider.embedding_dimension
    );
    match config.provider.resolve_api_key() {
        Ok(_) => println!("   ✅ API key: found"),
        Err(e) => println!("   ❌ API key: {}", e),
    }
    println!();

    println!("🔍 Knowledge Base Status:");
    let collection = &config.retrieval.collection_name;
    let index = match VectorIndex::open(config.vector_database_path()).await {
        Ok(index) => {
            println!("   ✅ LanceDB: {}", index.root().display());
            index
        }
        Err(e) => {
            println!("   ❌ LanceDB: Failed to open - {}", e);
            return Ok(());
        }
    };

    match index.manifest(collection).await {
        Ok(Some(manifest)) => {
            println!("   📚 Collection: {}", manifest.collection);
            println!("   🧩 Chunks: {}", manifest.chunk_count);
            println!("   🔢 Dimensions: {}", manifest.dimension);
            println!(
                "   🕒 Built: {}",
                manifest.built_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            match index.count(collection).await {
                Ok(rows) if rows == manifest.chunk_count => {}
                Ok(rows) => println!("   ⚠️  Table holds {} rows", rows),
                Err(e) => println!("   ❌ Active table unreadable - {}", e),
            }
        }
        Ok(None) => {
            println!("   💤 Not built yet");
            println!("   Use 'factory-brain ingest <FILE>' to build it.");
        }
        Err(e) => println!("   ❌ {}", e),
    }

    Ok(())
}
