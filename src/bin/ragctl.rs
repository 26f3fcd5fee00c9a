//! Admin CLI: ingest local files, ask questions, and inspect a chatbot's knowledge base
//! without going through the HTTP server.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ragbot::{
    config::Config,
    extract::{DocumentExtractor, TextExtractor, extension_of},
    index::format_timestamp,
    logging::{self, LogTarget},
    model::{ModelClient, OllamaClient},
    processing::{IngestionError, QueryRequest, RagApi, RagService},
};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "ragctl", about = "Manage chatbot knowledge bases")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest files, walking directories recursively.
    Ingest {
        #[arg(long)]
        chatbot: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Ask a question against a chatbot's knowledge base.
    Ask {
        #[arg(long)]
        chatbot: String,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        threshold: Option<f64>,
        question: String,
    },
    /// Check that the model server is reachable.
    Probe,
    /// Print knowledge base statistics.
    Stats {
        #[arg(long)]
        chatbot: String,
    },
    /// Delete every chunk of a chatbot.
    Clear {
        #[arg(long)]
        chatbot: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing("warn", LogTarget::Console);
    let config = Config::load().context("failed to load configuration")?;

    if let Command::Probe = cli.command {
        return probe(&config).await;
    }

    let service = RagService::new(&config)
        .await
        .context("failed to initialize service")?;
    match cli.command {
        Command::Ingest { chatbot, paths } => ingest(&service, &chatbot, &paths).await,
        Command::Ask {
            chatbot,
            limit,
            threshold,
            question,
        } => {
            let request = QueryRequest {
                message: question,
                limit,
                threshold,
            };
            ask(&service, &chatbot, request).await
        }
        Command::Stats { chatbot } => stats(&service, &chatbot).await,
        Command::Clear { chatbot } => {
            let removed = service
                .clear(&chatbot)
                .await
                .with_context(|| format!("failed to clear chatbot {chatbot}"))?;
            println!("Deleted {removed} chunks from {chatbot}");
            Ok(())
        }
        Command::Probe => Ok(()),
    }
}

async fn probe(config: &Config) -> Result<()> {
    let client = OllamaClient::new(config).context("failed to build model client")?;
    if client.probe().await {
        println!("Model server at {} is reachable", config.base_url);
        Ok(())
    } else {
        bail!("model server at {} is unreachable", config.base_url)
    }
}

fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let extractor = DocumentExtractor;
    let mut files = Vec::new();
    for root in paths {
        for entry in WalkDir::new(root).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    let extension = extension_of(&entry.file_name().to_string_lossy());
                    if extractor.supports(&extension) {
                        files.push(entry.into_path());
                    } else {
                        tracing::debug!(path = %entry.path().display(), "Skipping unsupported file");
                    }
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "Failed to walk path"),
            }
        }
    }
    files
}

async fn ingest(service: &RagService, chatbot: &str, paths: &[PathBuf]) -> Result<()> {
    let files = collect_files(paths);
    if files.is_empty() {
        bail!("no supported files (pdf, txt, md) found");
    }

    let mut failures = 0usize;
    for path in &files {
        match ingest_file(service, chatbot, path).await {
            Ok(line) => println!("{line}"),
            Err(err) => {
                failures += 1;
                println!("{}: failed: {err:#}", path.display());
            }
        }
    }

    if failures == files.len() {
        bail!("every file failed to ingest");
    }
    Ok(())
}

async fn ingest_file(service: &RagService, chatbot: &str, path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    match service.ingest_document(chatbot, &filename, bytes).await {
        Ok(report) => Ok(format!(
            "{}: {} chunks, {} stored, {} failed",
            path.display(),
            report.total,
            report.succeeded,
            report.failed
        )),
        Err(IngestionError::ServiceUnavailable(message)) => bail!(message),
        Err(err) => Err(err.into()),
    }
}

async fn ask(service: &RagService, chatbot: &str, request: QueryRequest) -> Result<()> {
    let answered = service.query(chatbot, request).await?;
    println!("{}", answered.answer);
    if answered.is_grounded() {
        println!();
        for (context, score) in answered
            .contexts_used
            .iter()
            .zip(answered.similarity_scores.iter())
        {
            println!("[{score:.3}] {context}");
        }
    }
    Ok(())
}

async fn stats(service: &RagService, chatbot: &str) -> Result<()> {
    let stats = service.stats(chatbot).await?;
    println!("chatbot:      {chatbot}");
    println!("chunks:       {}", stats.total_chunks);
    println!("tokens:       {}", stats.total_tokens);
    println!("files:        {}", stats.unique_files);
    println!(
        "last updated: {}",
        stats
            .last_updated
            .map(format_timestamp)
            .unwrap_or_else(|| "never".into())
    );
    Ok(())
}
