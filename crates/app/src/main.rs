use anyhow::{anyhow, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rulebook_rag_core::embeddings::{OPENAI_BASE_URL, OPENAI_EMBEDDING_DIMENSIONS, OPENAI_EMBEDDING_MODEL};
use rulebook_rag_core::layout::DEFAULT_SPLIT_X;
use rulebook_rag_core::llm::DEFAULT_CHAT_MODEL;
use rulebook_rag_core::merge::DEFAULT_MIN_CHARS;
use rulebook_rag_core::partition::DEFAULT_PARTITION_URL;
use rulebook_rag_core::stores::pinecone::DEFAULT_INDEX_NAME;
use rulebook_rag_core::tables::DEFAULT_TABLE_MATCH_THRESHOLD;
use rulebook_rag_core::{
    chunk_length_report, chunk_pdf, embed_chunks, load_vector_index, merge_chunks_by_size,
    read_jsonl, resolve_pdf_inputs, to_vector_records, write_jsonl, CharacterNgramEmbedder,
    ChatModel, Chunk, ChunkingOptions, ElementDumpPartitioner, Embedder, MemoryVectorStore,
    MergedChunk, OpenAiChatModel, OpenAiEmbedder, Partitioner, PineconeStore, QueryGraph,
    TableHtmlSource, UnstructuredClient, VectorIndex, DEFAULT_TOP_K, DEFAULT_UPSERT_BATCH_SIZE,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rulebook-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenAI API key used for embeddings and chat completions
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// OpenAI-compatible base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = OPENAI_BASE_URL)]
    openai_base_url: String,

    /// Embedding model name
    #[arg(long, default_value = OPENAI_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Embedding dimensions produced by the embedding model
    #[arg(long, default_value_t = OPENAI_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Chat model used to answer questions
    #[arg(long, default_value = DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Pinecone API key
    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true)]
    pinecone_api_key: Option<String>,

    /// Pinecone index name
    #[arg(long, env = "PINECONE_INDEX", default_value = DEFAULT_INDEX_NAME)]
    pinecone_index: String,

    /// Pinecone data-plane host; resolved from the index when omitted
    #[arg(long, env = "PINECONE_HOST")]
    pinecone_host: Option<String>,

    /// Document partitioning API key
    #[arg(long, env = "UNSTRUCTURED_API_KEY", hide_env_values = true)]
    unstructured_api_key: Option<String>,

    /// Document partitioning endpoint
    #[arg(long, env = "UNSTRUCTURED_API_URL", default_value = DEFAULT_PARTITION_URL)]
    unstructured_api_url: String,
}

#[derive(Subcommand)]
enum Command {
    /// Partition a PDF (or every PDF in a folder) into title-keyed chunks.
    Chunk {
        /// PDF file or folder containing PDFs.
        #[arg(long)]
        input: PathBuf,
        /// Output JSON-lines file of combined chunks.
        #[arg(long, default_value = "data/combined_chunks_output.jsonl")]
        output: PathBuf,
        /// Saved partition response to use instead of calling the partitioning API.
        #[arg(long)]
        elements: Option<PathBuf>,
        /// Saved table-HTML partition response.
        #[arg(long)]
        table_elements: Option<PathBuf>,
        /// Skip the table HTML enrichment pass.
        #[arg(long, default_value_t = false)]
        no_table_html: bool,
        /// Page x coordinate that separates the left and right columns.
        #[arg(long, default_value_t = DEFAULT_SPLIT_X)]
        split_x: f64,
        /// Minimum fuzzy score for attaching table HTML.
        #[arg(long, default_value_t = DEFAULT_TABLE_MATCH_THRESHOLD)]
        table_threshold: f64,
    },
    /// Merge small combined chunks up to a character threshold.
    Merge {
        #[arg(long, default_value = "data/combined_chunks_output.jsonl")]
        input: PathBuf,
        #[arg(long, default_value = "data/merged_chunks_by_size_output.jsonl")]
        output: PathBuf,
        #[arg(long, default_value_t = DEFAULT_MIN_CHARS)]
        min_chars: usize,
    },
    /// Embed every merged chunk.
    Embed {
        #[arg(long, default_value = "data/merged_chunks_by_size_output.jsonl")]
        input: PathBuf,
        #[arg(long, default_value = "data/embedded_chunks.jsonl")]
        output: PathBuf,
        /// Use the local hashing embedder instead of the embedding API.
        #[arg(long, default_value_t = false)]
        offline: bool,
    },
    /// Create the vector index if needed and load embedded chunks when it is empty.
    Load {
        #[arg(long, default_value = "data/embedded_chunks.jsonl")]
        input: PathBuf,
        #[arg(long, default_value_t = DEFAULT_UPSERT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Answer a question grounded in the indexed rulebook.
    Query {
        #[arg(long)]
        question: String,
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Retrieve from an embedded chunk file in memory instead of the hosted index.
        #[arg(long)]
        local_index: Option<PathBuf>,
        /// Embed the question with the local hashing embedder.
        #[arg(long, default_value_t = false)]
        offline: bool,
    },
    /// Print character and word length statistics of a chunk file.
    Stats {
        #[arg(long, default_value = "data/merged_chunks_by_size_output.jsonl")]
        input: PathBuf,
    },
}

fn require(value: &Option<String>, name: &str) -> anyhow::Result<String> {
    value
        .clone()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("{name} is not set"))
}

impl Cli {
    fn embedder(&self) -> anyhow::Result<OpenAiEmbedder> {
        Ok(OpenAiEmbedder::new(require(&self.openai_api_key, "OPENAI_API_KEY")?)
            .with_base_url(&self.openai_base_url)
            .with_model(&self.embedding_model, self.embedding_dimensions))
    }

    fn chat_model(&self) -> anyhow::Result<OpenAiChatModel> {
        Ok(OpenAiChatModel::new(require(&self.openai_api_key, "OPENAI_API_KEY")?)
            .with_base_url(&self.openai_base_url)
            .with_model(&self.chat_model))
    }

    fn pinecone(&self) -> anyhow::Result<PineconeStore> {
        let store = PineconeStore::new(
            require(&self.pinecone_api_key, "PINECONE_API_KEY")?,
            &self.pinecone_index,
        )?;
        Ok(match &self.pinecone_host {
            Some(host) => store.with_host(host)?,
            None => store,
        })
    }

    fn unstructured(&self) -> anyhow::Result<UnstructuredClient> {
        Ok(UnstructuredClient::new(
            &self.unstructured_api_url,
            require(&self.unstructured_api_key, "UNSTRUCTURED_API_KEY")?,
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "rulebook-rag boot"
    );

    match &cli.command {
        Command::Chunk {
            input,
            output,
            elements,
            table_elements,
            no_table_html,
            split_x,
            table_threshold,
        } => {
            let options = ChunkingOptions {
                split_x: *split_x,
                table_match_threshold: *table_threshold,
                ..ChunkingOptions::default()
            };

            let partitioner: Box<dyn Partitioner> = match elements {
                Some(dump) => Box::new(ElementDumpPartitioner::new(dump)) as Box<dyn Partitioner>,
                None => Box::new(cli.unstructured()?) as Box<dyn Partitioner>,
            };
            let table_source: Option<Box<dyn TableHtmlSource>> = match (table_elements, no_table_html) {
                (_, true) => None,
                (Some(dump), false) => {
                    Some(Box::new(ElementDumpPartitioner::new(dump)) as Box<dyn TableHtmlSource>)
                }
                (None, false) if elements.is_some() && cli.unstructured_api_key.is_none() => {
                    warn!("no table html source configured; tables keep their plain text");
                    None
                }
                (None, false) => Some(Box::new(cli.unstructured()?) as Box<dyn TableHtmlSource>),
            };

            let mut all_chunks: Vec<Chunk> = Vec::new();
            for path in resolve_pdf_inputs(input)? {
                let (chunks, report) = chunk_pdf(
                    partitioner.as_ref(),
                    table_source.as_deref(),
                    &path,
                    &options,
                )
                .await
                .with_context(|| format!("chunking {}", path.display()))?;
                println!(
                    "{}: elements={} junk={} tables_enriched={} chunks={}",
                    path.display(),
                    report.elements,
                    report.junk_dropped,
                    report.tables_enriched,
                    report.chunks
                );
                all_chunks.extend(chunks);
            }

            write_jsonl(output, &all_chunks)?;
            println!("{} chunks written to {}", all_chunks.len(), output.display());
        }
        Command::Merge {
            input,
            output,
            min_chars,
        } => {
            let chunks: Vec<Chunk> = read_jsonl(input)?;
            let merged = merge_chunks_by_size(&chunks, *min_chars);
            write_jsonl(output, &merged)?;
            println!(
                "{} chunks merged into {} at {}",
                chunks.len(),
                merged.len(),
                output.display()
            );
        }
        Command::Embed {
            input,
            output,
            offline,
        } => {
            let mut chunks: Vec<MergedChunk> = read_jsonl(input)?;
            if *offline {
                embed_chunks(&CharacterNgramEmbedder::default(), &mut chunks).await?;
            } else {
                embed_chunks(&cli.embedder()?, &mut chunks).await?;
            }
            write_jsonl(output, &chunks)?;
            println!("{} chunks embedded into {}", chunks.len(), output.display());
        }
        Command::Load { input, batch_size } => {
            let chunks: Vec<MergedChunk> = read_jsonl(input)?;
            let store = cli.pinecone()?;
            let report = load_vector_index(&store, &chunks, *batch_size).await?;
            if report.skipped {
                println!("Index already contains data. Skipping upsert.");
            } else {
                println!(
                    "{} vectors upserted in {} batches into {}",
                    report.upserted,
                    report.batches,
                    store.index_name()
                );
            }
        }
        Command::Query {
            question,
            top_k,
            local_index,
            offline,
        } => {
            let llm = cli.chat_model()?;
            match (local_index, offline) {
                (Some(path), true) => {
                    let store = local_store(path)?;
                    answer(CharacterNgramEmbedder::default(), store, llm, question, *top_k).await?
                }
                (Some(path), false) => {
                    let store = local_store(path)?;
                    answer(cli.embedder()?, store, llm, question, *top_k).await?
                }
                (None, true) => {
                    answer(CharacterNgramEmbedder::default(), cli.pinecone()?, llm, question, *top_k)
                        .await?
                }
                (None, false) => {
                    answer(cli.embedder()?, cli.pinecone()?, llm, question, *top_k).await?
                }
            }
        }
        Command::Stats { input } => {
            let chunks: Vec<MergedChunk> = read_jsonl(input)?;
            let report = chunk_length_report(chunks.iter().map(|chunk| chunk.text.as_str()))?;
            println!("Character length stats:\n{}\n", report.characters);
            println!("Word count stats:\n{}", report.words);
        }
    }

    Ok(())
}

fn local_store(path: &Path) -> anyhow::Result<MemoryVectorStore> {
    let chunks: Vec<MergedChunk> = read_jsonl(path)?;
    Ok(MemoryVectorStore::with_records(to_vector_records(&chunks)?))
}

async fn answer<E, V, L>(
    embedder: E,
    index: V,
    llm: L,
    question: &str,
    top_k: usize,
) -> anyhow::Result<()>
where
    E: Embedder,
    V: VectorIndex,
    L: ChatModel,
{
    let graph = QueryGraph::new(embedder, index, llm).with_top_k(top_k);
    let state = graph
        .run(question, |update| println!("{update}\n"))
        .await?;

    match state.answer {
        Some(answer) => println!("answer:\n{answer}"),
        None => warn!("query finished without an answer"),
    }
    Ok(())
}
