use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fieldctx_core::config::{resolve_with_base, BackendKind, Config, DataConfig, LogFormat, LoggingConfig};
use fieldctx_core::memory::MemoryChunkIndex;
use fieldctx_core::traits::EmbeddingProvider;
use fieldctx_core::{Chunk, FieldCatalog};
use fieldctx_embed::get_default_embedder;
use fieldctx_retrieval::RetrievalOrchestrator;
use fieldctx_text::TantivyChunkIndex;
use fieldctx_vector::LanceChunkIndex;

const SEED_BATCH: usize = 256;

#[derive(Parser)]
#[command(name = "fieldctx", version, about = "Assemble per-field retrieval context from indexed documents")]
struct Cli {
    /// Base config file; `config.<env>.toml` next to it is merged on top.
    #[arg(long, global = true, default_value = "config.toml", env = "FIELDCTX_CONFIG")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Retrieve context chunks for one field of one document.
    Retrieve {
        doc_id: String,
        field: String,
        /// Print the chunks as JSON instead of one line per chunk.
        #[arg(long)]
        json: bool,
    },
    /// List the configured fields.
    Fields,
    /// Load pre-chunked JSONL into the tantivy and lance indexes.
    Seed {
        jsonl: PathBuf,
        /// Embed chunks that carry no embedding with the configured provider.
        #[arg(long)]
        embed_missing: bool,
    },
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn config_base(path: &Path) -> PathBuf {
    path.parent().filter(|p| !p.as_os_str().is_empty()).map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

fn read_chunks(path: &Path) -> Result<Vec<Chunk>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut chunks = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk: Chunk = serde_json::from_str(&line).with_context(|| format!("{}:{}", path.display(), n + 1))?;
        chunks.push(chunk);
    }
    Ok(chunks)
}

async fn embed_missing(chunks: &mut [Chunk], embedder: &dyn EmbeddingProvider, pb: Option<&ProgressBar>) -> Result<usize> {
    let mut embedded = 0;
    for chunk in chunks.iter_mut().filter(|c| c.embedding.is_none() && !c.text.trim().is_empty()) {
        chunk.embedding = Some(embedder.embed(&chunk.text).await?);
        embedded += 1;
        if let Some(pb) = pb {
            pb.inc(1);
        }
    }
    Ok(embedded)
}

fn progress_bar(len: usize, what: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message(what.to_string());
    Ok(pb)
}

async fn build_orchestrator(config: &Config, base: &Path) -> Result<RetrievalOrchestrator> {
    let retrieval = config.retrieval()?;
    let data = config.data()?;
    let embedder = get_default_embedder(&config.embedding()?)?;
    let builder = RetrievalOrchestrator::builder(retrieval).embedder(Arc::clone(&embedder));
    let builder = match data.backend {
        BackendKind::Memory => {
            let path = resolve_with_base(base, &data.chunks_file);
            let mut chunks = read_chunks(&path)?;
            let embedded = embed_missing(&mut chunks, embedder.as_ref(), None).await?;
            info!(chunks = chunks.len(), embedded, path = %path.display(), "memory backend loaded");
            let index = Arc::new(MemoryChunkIndex::from_chunks(chunks));
            builder.lexical(index.clone()).semantic(index.clone()).hybrid(index.clone()).chunk_store(index)
        }
        BackendKind::TantivyLance => {
            let (text, vector) = open_file_backends(&data, base, embedder.dim()).await?;
            let text = Arc::new(text);
            builder.lexical(text.clone()).chunk_store(text).semantic(Arc::new(vector))
        }
    };
    Ok(builder.build()?)
}

async fn open_file_backends(data: &DataConfig, base: &Path, dim: usize) -> Result<(TantivyChunkIndex, LanceChunkIndex)> {
    let tantivy_dir = resolve_with_base(base, &data.tantivy_index_dir);
    let lancedb_dir = resolve_with_base(base, &data.lancedb_dir);
    let text = TantivyChunkIndex::open_or_create(&tantivy_dir)?;
    let vector = LanceChunkIndex::open(&lancedb_dir.to_string_lossy(), &data.lancedb_table, dim).await?;
    Ok((text, vector))
}

async fn retrieve(config: &Config, base: &Path, doc_id: &str, field: &str, json: bool) -> Result<()> {
    let catalog = FieldCatalog::from_config(config)?;
    let spec = catalog.get(field)?;
    let orchestrator = build_orchestrator(config, base).await?;
    let chunks = orchestrator.retrieve(doc_id, spec).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }
    if chunks.is_empty() {
        println!("no relevant content for '{field}' in {doc_id}");
    }
    for c in &chunks {
        println!("{}", c.explain());
        if !c.chunk.text.is_empty() {
            println!("    {}", c.chunk.text.replace('\n', " "));
        }
    }
    Ok(())
}

fn fields(config: &Config) -> Result<()> {
    let catalog = FieldCatalog::from_config(config)?;
    let default = config.retrieval()?.strategy;
    if catalog.is_empty() {
        println!("no fields configured");
    }
    for spec in catalog.iter() {
        println!(
            "{:<24} strategy={:?} top_k={} images={} lexical=\"{}\"",
            spec.field_name,
            spec.strategy.unwrap_or(default),
            spec.final_top_k,
            if spec.image_enabled { spec.max_images } else { 0 },
            spec.lexical_query()
        );
    }
    Ok(())
}

async fn seed(config: &Config, base: &Path, jsonl: &Path, embed: bool) -> Result<()> {
    let data = config.data()?;
    if data.backend != BackendKind::TantivyLance {
        bail!("seed writes the tantivy_lance backend; the memory backend reads {} directly", data.chunks_file);
    }
    let embedding = config.embedding()?;
    let mut chunks = read_chunks(jsonl)?;
    info!(chunks = chunks.len(), path = %jsonl.display(), "seeding indexes");
    if embed {
        let embedder = get_default_embedder(&embedding)?;
        let missing = chunks.iter().filter(|c| c.embedding.is_none() && !c.text.trim().is_empty()).count();
        let pb = progress_bar(missing, "embedding")?;
        embed_missing(&mut chunks, embedder.as_ref(), Some(&pb)).await?;
        pb.finish_and_clear();
    }
    let (text, vector) = open_file_backends(&data, base, embedding.dim).await?;
    let pb = progress_bar(chunks.len(), "indexing")?;
    let mut vectors = 0usize;
    for batch in chunks.chunks(SEED_BATCH) {
        text.add_chunks(batch)?;
        vectors += vector.add_chunks(batch).await?;
        pb.inc(batch.len() as u64);
    }
    pb.finish_with_message("done");
    println!("seeded {} chunks ({} with vectors) into tantivy and lance", chunks.len(), vectors);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_from(&cli.config).with_context(|| format!("loading {}", cli.config.display()))?;
    init_logging(&config.logging()?);
    let base = config_base(&cli.config);
    match cli.command {
        Command::Retrieve { doc_id, field, json } => retrieve(&config, &base, &doc_id, &field, json).await,
        Command::Fields => fields(&config),
        Command::Seed { jsonl, embed_missing: embed } => seed(&config, &base, &jsonl, embed).await,
    }
}
