pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod jsonl;
pub mod layout;
pub mod llm;
pub mod merge;
pub mod models;
pub mod orchestrator;
pub mod partition;
pub mod stats;
pub mod stores;
pub mod tables;
pub mod traits;

pub use chunking::combine_elements_for_rag;
pub use embeddings::{
    embed_chunks, CharacterNgramEmbedder, Embedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IngestError, SearchError};
pub use filter::{drop_junk, is_junk_element, JunkFilter};
pub use ingest::{
    chunk_pdf, discover_pdf_files, load_vector_index, resolve_pdf_inputs, to_vector_records,
    ChunkingReport, LoadReport, DEFAULT_UPSERT_BATCH_SIZE,
};
pub use jsonl::{read_jsonl, write_jsonl};
pub use layout::split_and_sort_elements_by_page;
pub use llm::{ChatModel, OpenAiChatModel};
pub use merge::merge_chunks_by_size;
pub use models::{
    Chunk, ChunkMetadata, ChunkingOptions, Element, ElementCategory, MergedChunk,
    MergedChunkMetadata, QueryState, VectorMatch, VectorMetadata, VectorRecord,
};
pub use orchestrator::{format_context, QueryGraph, Stage, StageOutput, StageUpdate, DEFAULT_TOP_K};
pub use partition::{
    ElementDumpPartitioner, PartitionStrategy, Partitioner, TableHtmlSource, UnstructuredClient,
};
pub use stats::{chunk_length_report, ChunkLengthReport, LengthStats};
pub use stores::{MemoryVectorStore, PineconeStore};
pub use tables::{enrich_tables_with_html, partial_ratio};
pub use traits::VectorIndex;
