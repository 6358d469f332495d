use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use memory_search::commands::{delete, import_chatgpt, ingest, query, show_status};
use memory_search::config::{Config, ConfigUpdate, show_config, update_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "memory-search")]
#[command(about = "Semantic search over your own notes and chat logs")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the collections
    #[arg(long, global = true, env = "MEMORY_SEARCH_DIR")]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change Ollama, chunking and index settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Embedding model served by Ollama
        #[arg(long)]
        model: Option<String>,
        /// Dimensionality of the model's embeddings
        #[arg(long)]
        dimension: Option<u32>,
        /// Collection to read and write
        #[arg(long)]
        collection: Option<String>,
        /// Results returned by a query when -k is not given
        #[arg(long)]
        default_k: Option<usize>,
    },
    /// Index a directory of logs, a single file, or a ChatGPT export
    Ingest {
        path: PathBuf,
        /// Replace the whole collection instead of updating the given sources
        #[arg(long)]
        rebuild: bool,
        /// Treat the path as a ChatGPT conversations.json export
        #[arg(long)]
        chatgpt: bool,
    },
    /// Find the passages most similar to a question; prompts when no text is given
    Query {
        text: Option<String>,
        /// Number of results
        #[arg(short)]
        k: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove every record of one source
    Delete {
        /// Source id, such as the file name it was ingested from
        source: String,
    },
    /// Show the state of the index and the embedding server
    Status,
    /// Write each conversation of a ChatGPT export to its own text file
    ImportChatgpt {
        /// Path to conversations.json
        export: PathBuf,
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => Config::default_base_dir().context("Could not determine a base directory")?,
    };
    let mut config = Config::load(&base_dir)?;

    match cli.command {
        Commands::Config {
            show,
            host,
            port,
            model,
            dimension,
            collection,
            default_k,
        } => {
            let update = ConfigUpdate {
                host,
                port,
                model,
                embedding_dimension: dimension,
                collection,
                default_k,
            };
            if !update.is_empty() {
                update_config(&mut config, &update)?;
            }
            if show || update.is_empty() {
                show_config(&config);
            }
        }
        Commands::Ingest {
            path,
            rebuild,
            chatgpt,
        } => {
            ingest(&config, &path, rebuild, chatgpt).await?;
        }
        Commands::Query { text, k, json } => {
            query(&config, text.as_deref(), k, json).await?;
        }
        Commands::Delete { source } => {
            delete(&config, &source).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
        Commands::ImportChatgpt { export, out_dir } => {
            import_chatgpt(&export, &out_dir)?;
        }
    }

    Ok(())
}
