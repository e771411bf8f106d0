use clap::{Parser, Subcommand};
use factory_brain::chat::QuickAction;
use factory_brain::commands::{
    ingest_document, query_knowledge, run_chat, run_console, show_status,
};
use factory_brain::config::{get_config_dir, run_interactive_config, show_config};
use factory_brain::{AssistError, Result};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "factory-brain")]
#[command(about = "Industrial maintenance assistant with a retrieval-augmented knowledge base")]
#[command(version)]
struct Cli {
    /// Use this directory for configuration and the knowledge base
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the model provider and knowledge base settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Rebuild the knowledge base from a plain-text document
    Ingest {
        /// Document to ingest
        file: PathBuf,
    },
    /// Show the knowledge base chunks closest to a question
    Query {
        question: String,
        /// Number of chunks to retrieve
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Chat with the maintenance assistant
    Chat {
        /// Start with a canned diagnostic question
        #[arg(long, value_enum)]
        quick: Option<QuickAction>,
    },
    /// Control the simulated robot fleet in natural language
    Console,
    /// Show configuration and knowledge base status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = get_config_dir(cli.config_dir.as_deref())
        .map_err(|e| AssistError::Config(e.to_string()))?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Ingest { file } => {
            ingest_document(&config_dir, &file).await?;
        }
        Commands::Query { question, top_k } => {
            query_knowledge(&config_dir, &question, top_k).await?;
        }
        Commands::Chat { quick } => {
            run_chat(&config_dir, quick).await?;
        }
        Commands::Console => {
            run_console(&config_dir)?;
        }
        Commands::Status => {
            show_status(&config_dir).await?;
        }
    }

    Ok(())
}
