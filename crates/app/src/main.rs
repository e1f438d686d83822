use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_chat_core::{
    ConversationAssembler, DocumentStatus, EmbeddingClient, FileBlobFetcher, HashEmbedder,
    HttpChatModel, HttpEmbeddingClient, IngestionPipeline, LopdfExtractor, MemoryDocumentStore,
    MemoryIndex, MemoryTurnStore, PineconeIndex, RetrievalEngine, UploadCompletion, VectorIndex,
    DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_TOP_K,
};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Run fully in-process: hashing embedder and in-memory vector index.
    #[arg(long, default_value_t = false)]
    local: bool,

    /// Vector index base URL (Pinecone-style HTTP API).
    #[arg(long, default_value = "http://localhost:5080")]
    index_url: String,

    /// Vector index API key.
    #[arg(long, env = "PINECONE_API_KEY")]
    index_api_key: Option<String>,

    /// Embedding backend base URL (expects a /vectorize route).
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    embed_url: String,

    /// Embedding dimensionality the backend produces.
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embed_dimensions: usize,

    /// Chat backend base URL (OpenAI-compatible streaming API).
    #[arg(long, default_value = "http://localhost:1234")]
    chat_url: String,

    /// Chat model identifier.
    #[arg(long, default_value = "gemini-pro")]
    chat_model: String,

    /// Chat backend API key.
    #[arg(long, env = "CHAT_API_KEY")]
    chat_api_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest one PDF into the vector index and print its document id.
    Ingest {
        /// Path to the PDF file.
        #[arg(long)]
        file: String,
        /// Owner identity to record on the document.
        #[arg(long, default_value = "local-user")]
        owner: String,
    },
    /// Ingest one PDF, then answer questions about it interactively.
    Chat {
        /// Path to the PDF file.
        #[arg(long)]
        file: String,
        /// Owner identity to record on the document.
        #[arg(long, default_value = "local-user")]
        owner: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-chat boot"
    );

    let mut model = HttpChatModel::new(&cli.chat_url, &cli.chat_model);
    if let Some(api_key) = &cli.chat_api_key {
        model = model.with_api_key(api_key);
    }

    if cli.local {
        run(cli.command, HashEmbedder::default(), MemoryIndex::new(), model).await
    } else {
        let api_key = cli
            .index_api_key
            .context("--index-api-key (or PINECONE_API_KEY) is required unless --local")?;
        let embedder = HttpEmbeddingClient::new(&cli.embed_url, cli.embed_dimensions);
        let index = PineconeIndex::new(&cli.index_url, api_key);
        run(cli.command, embedder, index, model).await
    }
}

async fn run<E, V>(command: Command, embedder: E, index: V, model: HttpChatModel) -> anyhow::Result<()>
where
    E: EmbeddingClient + Clone + 'static,
    V: VectorIndex + Clone + 'static,
{
    match command {
        Command::Ingest { file, owner } => {
            let documents = MemoryDocumentStore::new();
            let pipeline = IngestionPipeline::new(
                FileBlobFetcher,
                LopdfExtractor,
                embedder,
                index,
                documents,
            );

            let document = ingest_file(&pipeline, &file, &owner).await?;
            println!(
                "document {} ingested from {} at {}",
                document.id,
                file,
                Utc::now().to_rfc3339()
            );
        }
        Command::Chat { file, owner } => {
            let documents = MemoryDocumentStore::new();
            let turns = MemoryTurnStore::new();
            let pipeline = IngestionPipeline::new(
                FileBlobFetcher,
                LopdfExtractor,
                embedder.clone(),
                index.clone(),
                documents.clone(),
            );

            let document = ingest_file(&pipeline, &file, &owner).await?;
            println!("document {} ready, ask away (ctrl-d to quit)", document.id);

            let assembler = ConversationAssembler::new(
                RetrievalEngine::new(embedder, index),
                model,
                documents,
                turns,
                DEFAULT_TOP_K,
            );

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            prompt_marker()?;
            while let Some(line) = lines.next_line().await? {
                let question = line.trim();
                if question.is_empty() {
                    prompt_marker()?;
                    continue;
                }

                match assembler.answer(&document.id, &owner, question).await {
                    Ok(mut rx) => {
                        while let Some(fragment) = rx.recv().await {
                            match fragment {
                                Ok(text) => {
                                    print!("{text}");
                                    std::io::stdout().flush()?;
                                }
                                Err(error) => {
                                    eprintln!();
                                    eprintln!("generation failed: {error}");
                                    break;
                                }
                            }
                        }
                        println!();
                    }
                    Err(error) => eprintln!("request failed: {error}"),
                }
                prompt_marker()?;
            }
        }
    }

    Ok(())
}

async fn ingest_file<F, X, E, V, D>(
    pipeline: &IngestionPipeline<F, X, E, V, D>,
    file: &str,
    owner: &str,
) -> anyhow::Result<pdf_chat_core::Document>
where
    F: pdf_chat_core::BlobFetcher,
    X: pdf_chat_core::DocumentExtractor,
    E: EmbeddingClient,
    V: VectorIndex,
    D: pdf_chat_core::DocumentStore,
{
    let document = pipeline
        .accept_upload(UploadCompletion {
            owner_id: owner.to_string(),
            storage_key: file.to_string(),
            url: file.to_string(),
        })
        .await?;

    let status = pipeline.ingest(&document).await;
    if status != DocumentStatus::Success {
        anyhow::bail!("ingestion of {file} failed; see logs for the cause");
    }
    Ok(document)
}

fn prompt_marker() -> anyhow::Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}
