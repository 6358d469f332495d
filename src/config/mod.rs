// Configuration management module
// TOML settings under the base directory plus the `config` command helpers

pub mod settings;


use anyhow::{Context, Result};
use console::style;

pub use settings::{Config, ConfigError, IndexConfig, OllamaConfig};

/// Values a user asked to change from the command line
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub model: Option<String>,
    pub embedding_dimension: Option<u32>,
    pub collection: Option<String>,
    pub default_k: Option<usize>,
}

impl ConfigUpdate {
    #[inline]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply every requested change, leaving `config` untouched if any is invalid
    #[inline]
    pub fn apply(&self, config: &mut Config) -> Result<(), ConfigError> {
        let mut updated = config.clone();

        if let Some(host) = &self.host {
            updated.ollama.set_host(host.clone())?;
        }
        if let Some(port) = self.port {
            updated.ollama.set_port(port)?;
        }
        if let Some(model) = &self.model {
            updated.ollama.set_model(model.clone())?;
        }
        if let Some(dimension) = self.embedding_dimension {
            updated.ollama.set_embedding_dimension(dimension)?;
        }
        if let Some(collection) = &self.collection {
            updated.index.collection.clone_from(collection);
        }
        if let Some(k) = self.default_k {
            updated.index.default_k = k;
        }

        updated.validate()?;
        *config = updated;
        Ok(())
    }
}

/// Apply `update` and write the result to `config.toml`
#[inline]
pub fn update_config(config: &mut Config, update: &ConfigUpdate) -> Result<()> {
    update
        .apply(config)
        .context("Rejected configuration change")?;
    config.save().context("Failed to save configuration")?;

    println!(
        "{} {}",
        style("✓ Configuration saved to").green(),
        style(config.config_file_path().display()).dim()
    );
    Ok(())
}

#[inline]
pub fn show_config(config: &Config) {
    println!("{}", style("📋 Current Configuration").bold().cyan());
    println!();

    println!("{}", style("Ollama Settings:").bold().yellow());
    println!("  Host: {}", style(&config.ollama.host).cyan());
    println!("  Port: {}", style(config.ollama.port).cyan());
    println!("  Model: {}", style(&config.ollama.model).cyan());
    println!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
    println!(
        "  Embedding Dimension: {}",
        style(config.ollama.embedding_dimension).cyan()
    );
    println!("  Timeout: {}s", style(config.ollama.timeout_secs).cyan());
    match config.ollama_url() {
        Ok(url) => println!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => println!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    println!();
    println!("{}", style("Chunking:").bold().yellow());
    println!(
        "  Max Chunk Chars: {}",
        style(config.chunking.max_chunk_chars).cyan()
    );
    println!(
        "  Overlap Chars: {}",
        style(config.chunking.overlap_chars).cyan()
    );

    println!();
    println!("{}", style("Index:").bold().yellow());
    println!("  Collection: {}", style(&config.index.collection).cyan());
    println!("  Default k: {}", style(config.index.default_k).cyan());
    println!(
        "  Embed Concurrency: {}",
        style(config.index.embed_concurrency).cyan()
    );

    println!();
    println!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    println!("Index file: {}", style(config.index_path().display()).dim());
}
