pub mod memory;
pub mod pinecone;

pub use memory::MemoryVectorStore;
pub use pinecone::PineconeStore;
