use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use regqa_ai::answer::AnswerGenerator;
use regqa_ai::embeddings::OllamaEmbedder;
use regqa_ai::format::format_hits;
use regqa_ai::index::{
    BuildOutcome, CollectionOpen, DistanceMetric, EmbeddingIndex, SqliteVectorIndex,
};
use regqa_ai::llm::{CancelToken, GenerationOptions, OllamaLlm};
use regqa_ai::ollama::OllamaClient;
use regqa_ai::pipeline::RagPipeline;
use regqa_ai::retrieve::RetrievalEngine;
use regqa_core::chunk_store::{load_chunks, save_chunks};
use regqa_core::chunking::{load_regulation, ChunkParser};
use regqa_core::config::AppConfig;
use regqa_core::domain::Chunk;
use regqa_core::error::{codes, AppError};

fn open_index(cfg: &AppConfig, client: &OllamaClient) -> Result<Arc<EmbeddingIndex>, AppError> {
    let path = cfg.index_db_path();
    let (store, open) = SqliteVectorIndex::open(&path, &cfg.collection, DistanceMetric::Cosine)?;
    match open {
        CollectionOpen::Created => {
            tracing::info!(
                collection = %cfg.collection,
                path = %path.display(),
                "created collection"
            )
        }
        CollectionOpen::Loaded => {
            tracing::debug!(
                collection = %cfg.collection,
                path = %path.display(),
                "loaded collection"
            )
        }
    }
    Ok(Arc::new(EmbeddingIndex::new(
        Box::new(store),
        Arc::new(OllamaEmbedder::new(client.clone())),
        cfg.embedding_model.clone(),
        cfg.embed_batch_size,
    )))
}

fn parse_regulation(cfg: &AppConfig, input: Option<PathBuf>) -> Result<Vec<Chunk>, AppError> {
    let parser = ChunkParser::new(&cfg.article_marker)?;
    let path = input.unwrap_or_else(|| cfg.regulation_path());
    let chunks = load_regulation(&parser, &path)?;
    tracing::info!(count = chunks.len(), path = %path.display(), "parsed regulation");
    Ok(chunks)
}

fn read_chunk_file(cfg: &AppConfig) -> Result<Vec<Chunk>, AppError> {
    let path = cfg.chunks_path();
    let loaded = load_chunks(&path)?;
    if loaded.skipped_blocks > 0 {
        tracing::warn!(
            skipped = loaded.skipped_blocks,
            path = %path.display(),
            "skipped malformed chunk blocks"
        );
    }
    Ok(loaded.chunks)
}

/// Index the saved chunks (or the parsed regulation) when the collection is still empty.
fn ensure_indexed(cfg: &AppConfig, index: &EmbeddingIndex) -> Result<(), AppError> {
    if index.count()? > 0 {
        return Ok(());
    }
    let chunks = if cfg.chunks_path().is_file() {
        read_chunk_file(cfg)?
    } else {
        parse_regulation(cfg, None)?
    };
    tracing::info!(count = chunks.len(), "index is empty; indexing before the first question");
    index.build(&chunks, false)?;
    Ok(())
}

fn print_outcome(outcome: BuildOutcome) {
    match outcome {
        BuildOutcome::Indexed { count } => println!("indexed {count} chunks"),
        BuildOutcome::Skipped { count } => {
            println!("index already holds {count} chunks; use --force to rebuild")
        }
    }
}

fn write_err(e: std::io::Error) -> AppError {
    AppError::new(codes::GENERATION_FAILED, "Failed to write streamed output")
        .with_details(e.to_string())
}

pub fn chunk(
    cfg: &AppConfig,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<(), AppError> {
    let chunks = parse_regulation(cfg, input)?;
    let out = output.unwrap_or_else(|| cfg.chunks_path());
    save_chunks(&chunks, &out)?;
    println!("saved {} chunks to {}", chunks.len(), out.display());
    Ok(())
}

pub fn init(cfg: &AppConfig) -> Result<(), AppError> {
    let client = OllamaClient::new(&cfg.ollama_host)?;
    let chunks = parse_regulation(cfg, None)?;
    let out = cfg.chunks_path();
    save_chunks(&chunks, &out)?;
    println!("saved {} chunks to {}", chunks.len(), out.display());

    let index = open_index(cfg, &client)?;
    print_outcome(index.build(&chunks, true)?);
    Ok(())
}

pub fn index(cfg: &AppConfig, force: bool, from_chunks: bool) -> Result<(), AppError> {
    let client = OllamaClient::new(&cfg.ollama_host)?;
    let chunks = if from_chunks {
        read_chunk_file(cfg)?
    } else {
        parse_regulation(cfg, None)?
    };

    let index = open_index(cfg, &client)?;
    print_outcome(index.build(&chunks, force)?);
    Ok(())
}

pub fn ask(
    cfg: &AppConfig,
    question: &str,
    k: Option<usize>,
    stream: bool,
) -> Result<(), AppError> {
    let client = OllamaClient::new(&cfg.ollama_host)?;
    let index = open_index(cfg, &client)?;
    ensure_indexed(cfg, &index)?;

    let generator = AnswerGenerator::new(
        Arc::new(OllamaLlm::new(
            client,
            Duration::from_secs(cfg.generation_timeout_secs),
        )),
        GenerationOptions {
            model: cfg.llm_model.clone(),
            temperature: cfg.temperature,
        },
        cfg.context_max_chars,
    );
    let pipeline = RagPipeline::new(RetrievalEngine::new(index), generator, cfg.n_results);
    let k = k.unwrap_or(cfg.n_results);

    if !stream {
        println!("{}", pipeline.query_with_k(question, k)?);
        return Ok(());
    }

    let mut stdout = std::io::stdout().lock();
    let mut shown = String::new();
    for emission in pipeline.query_streaming_with_k(question, k, CancelToken::new())? {
        let emission = emission?;
        // Each emission replaces the previous one; print only what was appended.
        let text = match emission.strip_prefix(shown.as_str()) {
            Some(suffix) => suffix.to_string(),
            None => format!("\n\n{emission}"),
        };
        write!(stdout, "{text}")
            .and_then(|_| stdout.flush())
            .map_err(write_err)?;
        shown = emission;
    }
    writeln!(stdout).map_err(write_err)?;
    Ok(())
}

pub fn search(cfg: &AppConfig, question: &str, k: Option<usize>) -> Result<(), AppError> {
    let client = OllamaClient::new(&cfg.ollama_host)?;
    let index = open_index(cfg, &client)?;
    ensure_indexed(cfg, &index)?;

    let r = RetrievalEngine::new(index).retrieve(question, k.unwrap_or(cfg.n_results))?;
    if r.is_empty() {
        println!("no matching passages");
        return Ok(());
    }
    print!("{}", format_hits(&r.documents, &r.metadatas, &r.distances));
    Ok(())
}

pub fn status(cfg: &AppConfig) -> Result<(), AppError> {
    let client = OllamaClient::new(&cfg.ollama_host)?;
    match client.health_check() {
        Ok(()) => println!("ollama: ok ({})", client.base_url()),
        Err(e) => println!("ollama: unavailable ({e})"),
    }

    let index = open_index(cfg, &client)?;
    let info = index.info()?;
    println!("collection: {} ({})", info.name, info.metric.as_str());
    println!("index: {}", cfg.index_db_path().display());
    println!("entries: {}", info.count);
    println!(
        "embedding model: {}",
        info.embedding_model.as_deref().unwrap_or("-")
    );
    println!(
        "dims: {}",
        info.dims.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
    );
    println!("updated: {}", info.updated_at.as_deref().unwrap_or("-"));
    if info.count > 0 && info.embedding_model.as_deref() != Some(cfg.embedding_model.as_str()) {
        println!(
            "warning: configured embedding model is {}; run `regqa index --force`",
            cfg.embedding_model
        );
    }
    Ok(())
}
