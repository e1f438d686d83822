pub mod chat;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod retrieval;
pub mod store;
pub mod stores;
pub mod traits;

pub use chat::{build_grounded_prompt, ConversationAssembler, HISTORY_LIMIT};
pub use embeddings::{
    EmbeddingClient, HashEmbedder, HttpEmbeddingClient, DEFAULT_EMBEDDING_DIMENSIONS,
    HASH_EMBEDDER_DIMENSIONS,
};
pub use error::{
    ChatError, EmbeddingError, ExtractionError, FetchError, GenerationError, IndexError,
    IngestError, RetrievalError, StoreError,
};
pub use extractor::{DocumentExtractor, LopdfExtractor, PageText};
pub use ingest::{
    FileBlobFetcher, HttpBlobFetcher, IngestionPipeline, DEFAULT_EMBED_CONCURRENCY,
};
pub use llm::HttpChatModel;
pub use models::{
    ChunkMetadata, ConversationTurn, Document, DocumentStatus, IndexItem, PromptTurn,
    RetrievedSnippet, TurnRole, UploadCompletion, VectorMatch,
};
pub use normalize::normalize;
pub use retrieval::{RetrievalEngine, DEFAULT_TOP_K};
pub use store::{DocumentStore, MemoryDocumentStore, MemoryTurnStore, TurnStore};
pub use stores::{MemoryIndex, PineconeIndex};
pub use traits::{BlobFetcher, LanguageModel, VectorIndex};
