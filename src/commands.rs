use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::documents::chatgpt::{export_conversations, load_export};
use crate::documents::{Document, load_directory, load_file};
use crate::embeddings::{EmbeddingClient, OllamaClient};
use crate::indexer::{IndexManager, IndexOptions, IngestReport};
use crate::query::{QueryAnswer, QueryEngine};

/// Documents gathered for one ingestion run, plus what could not be read
#[derive(Debug, Default)]
pub struct DocumentBatch {
    pub documents: Vec<Document>,
    /// Human-readable descriptions of skipped inputs
    pub skipped: Vec<String>,
}

/// Read documents from a directory of logs, a single log file, or a ChatGPT export
#[inline]
pub fn load_documents(path: &Path, chatgpt: bool) -> Result<DocumentBatch> {
    if chatgpt {
        let export = load_export(path)
            .with_context(|| format!("Failed to read ChatGPT export {}", path.display()))?;
        let mut skipped = Vec::new();
        if export.skipped_messages > 0 {
            skipped.push(format!(
                "{} malformed messages in {}",
                export.skipped_messages,
                path.display()
            ));
        }
        if export.skipped_conversations > 0 {
            skipped.push(format!(
                "{} unusable conversations in {}",
                export.skipped_conversations,
                path.display()
            ));
        }
        return Ok(DocumentBatch {
            documents: export.documents,
            skipped,
        });
    }

    if path.is_dir() {
        let load = load_directory(path)
            .with_context(|| format!("Failed to read directory {}", path.display()))?;
        return Ok(DocumentBatch {
            documents: load.documents,
            skipped: load
                .skipped
                .into_iter()
                .map(|(file, reason)| format!("{}: {}", file, reason))
                .collect(),
        });
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} is not a file", path.display()))?;
    let document = load_file(path, &file_name)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(DocumentBatch {
        documents: vec![document],
        skipped: Vec::new(),
    })
}

fn embedding_client(config: &Config) -> Result<EmbeddingClient> {
    let ollama = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    let budget = ollama.call_budget();
    Ok(EmbeddingClient::new(Arc::new(ollama)).with_timeout(budget))
}

async fn open_index(config: &Config, embedder: EmbeddingClient) -> Result<IndexManager> {
    let manager = IndexManager::open(
        config.index_path(),
        IndexOptions::from_config(config),
        embedder,
    )
    .await
    .with_context(|| format!("Failed to open index {}", config.index_path().display()))?;
    Ok(manager)
}

fn progress_bar() -> ProgressBar {
    if console::user_attended_stderr() {
        let style = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} chunks embedded")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        ProgressBar::new(0).with_style(style)
    } else {
        ProgressBar::hidden()
    }
}

/// Index documents, either replacing the collection or updating the given sources
#[inline]
pub async fn ingest(config: &Config, path: &Path, rebuild: bool, chatgpt: bool) -> Result<()> {
    let batch = load_documents(path, chatgpt)?;
    for skipped in &batch.skipped {
        println!("{} {}", style("⚠️  Skipped").yellow(), skipped);
    }

    if batch.documents.is_empty() && !rebuild {
        println!("No documents found in {}", path.display());
        return Ok(());
    }

    info!(
        "Ingesting {} documents from {}",
        batch.documents.len(),
        path.display()
    );

    let manager = open_index(config, embedding_client(config)?)
        .await?
        .with_progress(progress_bar());

    let report = if rebuild {
        manager.rebuild_from(&batch.documents).await
    } else {
        manager.ingest_incremental(&batch.documents).await
    }
    .context("Ingestion failed; the existing index was left unchanged")?;

    print_report(config, &report);
    Ok(())
}

fn print_report(config: &Config, report: &IngestReport) {
    println!(
        "{} {}",
        style("✓ Indexed into").green(),
        style(&config.index.collection).bold()
    );
    println!("  Documents: {}", style(report.documents).cyan());
    println!("  Chunks: {}", style(report.chunks).cyan());
    println!("  Records: {}", style(report.records).cyan());
    println!("  Generation: {}", style(report.generation).cyan());

    if !report.skipped.is_empty() {
        println!(
            "  {} {} chunks with unexpected embedding size",
            style("Skipped").yellow(),
            report.skipped.len()
        );
        for chunk in &report.skipped {
            println!("    {} ({}): {}", chunk.source_id, chunk.chunk_id, chunk.reason);
        }
    }
}

/// Answer one query, or prompt repeatedly when `text` is absent
#[inline]
pub async fn query(config: &Config, text: Option<&str>, k: Option<usize>, json: bool) -> Result<()> {
    let embedder = embedding_client(config)?;
    let manager = Arc::new(open_index(config, embedder.clone()).await?);
    let engine = QueryEngine::new(manager, embedder).with_default_k(config.index.default_k);

    if let Some(text) = text {
        let answers = engine.answer(text, k).await?;
        return print_answers(&answers, json);
    }

    loop {
        let question: String = Input::new()
            .with_prompt("🔍 Ask your memory (exit to quit)")
            .interact_text()
            .context("Failed to read question")?;

        let question = question.trim();
        if matches!(question.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        match engine.answer(question, k).await {
            Ok(answers) => print_answers(&answers, json)?,
            Err(e) => {
                warn!("Query failed: {}", e);
                println!("{} {}", style("✗").red(), e);
            }
        }
    }

    Ok(())
}

fn print_answers(answers: &[QueryAnswer], json: bool) -> Result<()> {
    if json {
        let output =
            serde_json::to_string_pretty(answers).context("Failed to serialize results")?;
        println!("{}", output);
        return Ok(());
    }

    if answers.is_empty() {
        println!("{}", style("No matching memories.").yellow());
        return Ok(());
    }

    println!();
    println!("{}", style("🧠 Memory says:").bold().cyan());
    for (rank, answer) in answers.iter().enumerate() {
        println!();
        let when = answer
            .metadata
            .timestamp
            .map(|t| format!(" · {}", t.format("%Y-%m-%d")))
            .unwrap_or_default();
        println!(
            "{} {} {}{}",
            style(format!("{}.", rank + 1)).bold(),
            style(&answer.metadata.source_id).green(),
            style(format!("({:.3})", answer.score)).dim(),
            style(when).dim()
        );
        for line in answer.text.lines() {
            println!("   {}", line);
        }
    }

    Ok(())
}

/// Remove every record of one source
#[inline]
pub async fn delete(config: &Config, source_id: &str) -> Result<()> {
    let manager = open_index(config, embedding_client(config)?).await?;
    let removed = manager.delete_source(source_id).await?;

    if removed == 0 {
        println!("Source {} is not in the index.", style(source_id).yellow());
    } else {
        println!(
            "{} {} records of {}",
            style("✓ Deleted").green(),
            removed,
            style(source_id).bold()
        );
    }
    Ok(())
}

#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("{}", style("📊 Memory Search Status").bold().cyan());
    println!("{}", "=".repeat(50));
    println!();

    let ollama = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    let model = ollama.model().to_string();
    let health = {
        let client = ollama.clone();
        tokio::task::spawn_blocking(move || client.health_check()).await
    };

    println!("🤖 Ollama Status:");
    match health {
        Ok(Ok(())) => {
            println!(
                "   ✅ Ollama: Connected ({}:{})",
                config.ollama.host, config.ollama.port
            );
            println!("   📋 Model: {}", model);
        }
        Ok(Err(e)) => println!("   ⚠️  Ollama: Unavailable - {:#}", e),
        Err(e) => println!("   ❌ Ollama: Health check failed - {}", e),
    }
    println!();

    let budget = ollama.call_budget();
    let embedder = EmbeddingClient::new(Arc::new(ollama)).with_timeout(budget);
    println!("🔍 Index Status:");
    match open_index(config, embedder).await {
        Ok(manager) => {
            let status = manager.status().await;
            println!("   Collection: {}", style(&status.collection).bold());
            println!("   File: {}", style(status.path.display()).dim());
            match status.stats {
                Some(stats) => {
                    println!("   Generation: {}", style(stats.generation).cyan());
                    println!("   Records: {}", style(stats.records).cyan());
                    println!("   Sources: {}", style(stats.sources).cyan());
                    println!("   Dimensions: {}", style(stats.dimension).cyan());
                }
                None => println!(
                    "   {} run 'memory-search ingest <path>' to build it",
                    style("Not built yet;").yellow()
                ),
            }
        }
        Err(e) => println!("   ❌ {:#}", e),
    }

    Ok(())
}

/// Write each conversation of a ChatGPT export to its own text file
#[inline]
pub fn import_chatgpt(export_path: &Path, out_dir: &Path) -> Result<()> {
    let export = export_conversations(export_path, out_dir).with_context(|| {
        format!(
            "Failed to export conversations from {}",
            export_path.display()
        )
    })?;

    println!(
        "{} {} conversations to {}",
        style("✓ Exported").green(),
        export.documents.len(),
        style(out_dir.display()).bold()
    );
    if export.skipped_messages > 0 {
        println!(
            "  {} {} malformed messages",
            style("Skipped").yellow(),
            export.skipped_messages
        );
    }
    if export.skipped_conversations > 0 {
        println!(
            "  {} {} unusable conversations",
            style("Skipped").yellow(),
            export.skipped_conversations
        );
    }
    Ok(())
}
