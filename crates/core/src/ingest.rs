use crate::error::{ChatError, EmbeddingError, FetchError, IngestError, StoreError};
use crate::extractor::DocumentExtractor;
use crate::models::{ChunkMetadata, Document, DocumentStatus, IndexItem, UploadCompletion};
use crate::normalize::normalize;
use crate::store::DocumentStore;
use crate::traits::{BlobFetcher, VectorIndex};
use crate::EmbeddingClient;
use async_trait::async_trait;
use futures_util::future::try_join_all;
use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub const DEFAULT_EMBED_CONCURRENCY: usize = 4;

#[derive(Clone, Default)]
pub struct HttpBlobFetcher {
    client: Client,
}

impl HttpBlobFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobFetcher for HttpBlobFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Reads local paths instead of URLs; used by the CLI and tests.
#[derive(Clone, Copy, Default)]
pub struct FileBlobFetcher;

#[async_trait]
impl BlobFetcher for FileBlobFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        Ok(tokio::fs::read(url).await?)
    }
}

/// Drives a document from uploaded bytes to an indexed namespace:
/// fetch, extract, normalize, embed (bounded parallelism), upsert. Every
/// failure along the way terminates in `Failed` status rather than an error
/// escaping to the caller.
pub struct IngestionPipeline<F, X, E, V, D>
where
    F: BlobFetcher,
    X: DocumentExtractor,
    E: EmbeddingClient,
    V: VectorIndex,
    D: DocumentStore,
{
    fetcher: F,
    extractor: X,
    embedder: E,
    index: V,
    documents: D,
    embed_concurrency: usize,
}

impl<F, X, E, V, D> IngestionPipeline<F, X, E, V, D>
where
    F: BlobFetcher,
    X: DocumentExtractor,
    E: EmbeddingClient,
    V: VectorIndex,
    D: DocumentStore,
{
    pub fn new(fetcher: F, extractor: X, embedder: E, index: V, documents: D) -> Self {
        Self {
            fetcher,
            extractor,
            embedder,
            index,
            documents,
            embed_concurrency: DEFAULT_EMBED_CONCURRENCY,
        }
    }

    pub fn with_embed_concurrency(mut self, limit: usize) -> Self {
        self.embed_concurrency = limit.max(1);
        self
    }

    /// Entry point for the upload service's completion callback: records the
    /// document as already processing and returns it for ingestion.
    pub async fn accept_upload(&self, upload: UploadCompletion) -> Result<Document, StoreError> {
        let mut document = Document::new(upload.owner_id, upload.url);
        document.status = DocumentStatus::Processing;
        self.documents.create(&document).await?;
        info!(document_id = %document.id, storage_key = %upload.storage_key, "upload accepted");
        Ok(document)
    }

    /// Runs the full ingestion for one document and returns its final
    /// status. Failures are recorded on the document and logged, never
    /// propagated; re-ingestion is an external decision (re-upload).
    pub async fn ingest(&self, document: &Document) -> DocumentStatus {
        if let Err(error) = self
            .documents
            .set_status(&document.id, DocumentStatus::Processing)
            .await
        {
            warn!(document_id = %document.id, %error, "could not mark document processing");
            return DocumentStatus::Failed;
        }

        let outcome = self.run(document).await;
        let status = match &outcome {
            Ok(pages) => {
                info!(document_id = %document.id, pages, "ingestion complete");
                DocumentStatus::Success
            }
            Err(error) => {
                warn!(document_id = %document.id, %error, "ingestion failed");
                DocumentStatus::Failed
            }
        };

        if let Err(error) = self.documents.set_status(&document.id, status).await {
            warn!(document_id = %document.id, %error, "could not record final status");
        }
        status
    }

    async fn run(&self, document: &Document) -> Result<usize, IngestError> {
        let bytes = self.fetcher.fetch(&document.source_url).await?;
        let pages = self.extractor.extract(&bytes)?;

        let texts: Vec<(u32, String)> = pages
            .iter()
            .map(|page| {
                let normalized = normalize(&page.text);
                // A page stripped to nothing by stopword removal still gets
                // indexed on its raw text so coverage stays complete.
                let text = if normalized.is_empty() {
                    page.text.trim().to_string()
                } else {
                    normalized
                };
                (page.number, text)
            })
            .collect();

        let semaphore = Semaphore::new(self.embed_concurrency);
        let embeds = texts.iter().map(|(_, text)| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|error| EmbeddingError::Permanent(format!("semaphore closed: {error}")))?;
                self.embedder.embed(text).await
            }
        });

        // try_join_all keeps page order, so item ids line up with pages no
        // matter which embed call finishes first.
        let vectors = try_join_all(embeds).await?;

        let items: Vec<IndexItem> = texts
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, ((page_number, text), vector))| IndexItem {
                id: format!("{}-{}", document.id, index),
                vector,
                metadata: ChunkMetadata {
                    text: text.clone(),
                    page_number: *page_number,
                    document_id: document.id.clone(),
                },
            })
            .collect();

        self.index.upsert(&document.id, &items).await?;
        Ok(items.len())
    }

    /// Removes an owned document and its namespace. Tolerates a namespace
    /// that was never populated.
    pub async fn delete_document(
        &self,
        document_id: &str,
        owner_id: &str,
    ) -> Result<Document, ChatError> {
        let document = self
            .documents
            .find_owned(document_id, owner_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(document_id.to_string()))?;

        // Namespace first: if the index delete fails, the record survives so
        // a retry can still reach the orphaned vectors.
        self.index.delete_namespace(document_id).await?;
        self.documents.delete(document_id).await?;
        info!(document_id, "document deleted");
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::{FileBlobFetcher, IngestionPipeline};
    use crate::embeddings::HashEmbedder;
    use crate::error::{EmbeddingError, ExtractionError, FetchError, IndexError};
    use crate::models::{IndexItem, VectorMatch};
    use crate::extractor::{one_page_pdf, DocumentExtractor, LopdfExtractor, PageText};
    use crate::models::{Document, DocumentStatus, UploadCompletion};
    use crate::store::{DocumentStore, MemoryDocumentStore};
    use crate::stores::MemoryIndex;
    use crate::traits::{BlobFetcher, VectorIndex};
    use crate::EmbeddingClient;
    use async_trait::async_trait;
    use std::io::Write;

    struct StaticFetcher(Vec<u8>);

    #[async_trait]
    impl BlobFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            Ok(self.0.clone())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl BlobFetcher for FailingFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    struct PagesExtractor(Vec<PageText>);

    impl DocumentExtractor for PagesExtractor {
        fn extract(&self, _bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError> {
            Ok(self.0.clone())
        }
    }

    /// Fails on any text containing the poison marker.
    struct PoisonEmbedder {
        inner: HashEmbedder,
        poison: &'static str,
    }

    #[async_trait]
    impl EmbeddingClient for PoisonEmbedder {
        fn dimensions(&self) -> usize {
            self.inner.dimensions
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if text.contains(self.poison) {
                return Err(EmbeddingError::Transient("backend 503".to_string()));
            }
            self.inner.embed(text).await
        }
    }

    /// Working index whose namespace deletes always fail.
    #[derive(Clone)]
    struct BrokenDeleteIndex {
        inner: MemoryIndex,
    }

    #[async_trait]
    impl VectorIndex for BrokenDeleteIndex {
        async fn upsert(&self, namespace: &str, items: &[IndexItem]) -> Result<(), IndexError> {
            self.inner.upsert(namespace, items).await
        }

        async fn query(
            &self,
            namespace: &str,
            vector: &[f32],
            top_k: usize,
        ) -> Result<Vec<VectorMatch>, IndexError> {
            self.inner.query(namespace, vector, top_k).await
        }

        async fn delete_namespace(&self, _namespace: &str) -> Result<(), IndexError> {
            Err(IndexError::Request("index unavailable".to_string()))
        }
    }

    fn pages(texts: &[&str]) -> Vec<PageText> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| PageText {
                number: (i + 1) as u32,
                text: (*text).to_string(),
            })
            .collect()
    }

    async fn processing_document(documents: &MemoryDocumentStore) -> Document {
        let document = Document::new("alice", "mem://doc.pdf");
        documents.create(&document).await.unwrap();
        document
    }

    #[tokio::test]
    async fn one_page_hello_world_succeeds_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.pdf");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&one_page_pdf("Hello World")).unwrap();

        let documents = MemoryDocumentStore::new();
        let index = MemoryIndex::new();
        let pipeline = IngestionPipeline::new(
            FileBlobFetcher,
            LopdfExtractor,
            HashEmbedder::default(),
            index.clone(),
            documents.clone(),
        );

        let document = pipeline
            .accept_upload(UploadCompletion {
                owner_id: "alice".to_string(),
                storage_key: "hello.pdf".to_string(),
                url: path.to_string_lossy().to_string(),
            })
            .await
            .unwrap();
        assert_eq!(document.status, DocumentStatus::Processing);

        let status = pipeline.ingest(&document).await;
        assert_eq!(status, DocumentStatus::Success);

        let stored = documents
            .find_owned(&document.id, "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, DocumentStatus::Success);

        let embedder = HashEmbedder::default();
        let query = embedder.embed("hello world").await.unwrap();
        let matches = index.query(&document.id, &query, 5).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, format!("{}-0", document.id));
        assert_eq!(matches[0].metadata.page_number, 1);
        assert_eq!(matches[0].metadata.text, "hello world");
    }

    #[tokio::test]
    async fn chunk_ids_are_contiguous_per_page() {
        let documents = MemoryDocumentStore::new();
        let index = MemoryIndex::new();
        let pipeline = IngestionPipeline::new(
            StaticFetcher(Vec::from(*b"pdf")),
            PagesExtractor(pages(&["first page text", "second page text", "third page text"])),
            HashEmbedder::default(),
            index.clone(),
            documents.clone(),
        )
        .with_embed_concurrency(2);

        let document = processing_document(&documents).await;
        let status = pipeline.ingest(&document).await;
        assert_eq!(status, DocumentStatus::Success);

        let embedder = HashEmbedder::default();
        let query = embedder.embed("page text").await.unwrap();
        let mut matches = index.query(&document.id, &query, 10).await.unwrap();
        matches.sort_by(|a, b| a.id.cmp(&b.id));

        assert_eq!(matches.len(), 3);
        for (i, m) in matches.iter().enumerate() {
            assert_eq!(m.id, format!("{}-{}", document.id, i));
            assert_eq!(m.metadata.page_number, (i + 1) as u32);
            assert_eq!(m.metadata.document_id, document.id);
        }
    }

    #[tokio::test]
    async fn fetch_failure_marks_document_failed() {
        let documents = MemoryDocumentStore::new();
        let index = MemoryIndex::new();
        let pipeline = IngestionPipeline::new(
            FailingFetcher,
            LopdfExtractor,
            HashEmbedder::default(),
            index.clone(),
            documents.clone(),
        );

        let document = processing_document(&documents).await;
        let status = pipeline.ingest(&document).await;
        assert_eq!(status, DocumentStatus::Failed);

        let stored = documents
            .find_owned(&document.id, "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, DocumentStatus::Failed);
    }

    #[tokio::test]
    async fn extraction_failure_marks_document_failed() {
        let documents = MemoryDocumentStore::new();
        let pipeline = IngestionPipeline::new(
            StaticFetcher(Vec::from(*b"not a pdf at all")),
            LopdfExtractor,
            HashEmbedder::default(),
            MemoryIndex::new(),
            documents.clone(),
        );

        let document = processing_document(&documents).await;
        assert_eq!(pipeline.ingest(&document).await, DocumentStatus::Failed);
    }

    #[tokio::test]
    async fn single_page_embed_failure_fails_whole_ingestion() {
        let documents = MemoryDocumentStore::new();
        let index = MemoryIndex::new();
        let pipeline = IngestionPipeline::new(
            StaticFetcher(Vec::from(*b"pdf")),
            PagesExtractor(pages(&["good page", "poison page", "another good page"])),
            PoisonEmbedder {
                inner: HashEmbedder::default(),
                poison: "poison",
            },
            index.clone(),
            documents.clone(),
        );

        let document = processing_document(&documents).await;
        let status = pipeline.ingest(&document).await;
        assert_eq!(status, DocumentStatus::Failed);

        // No partial index: the namespace must be empty after a failure.
        let matches = index.query(&document.id, &[0.0; 128], 10).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn delete_document_checks_ownership_and_clears_namespace() {
        let documents = MemoryDocumentStore::new();
        let index = MemoryIndex::new();
        let pipeline = IngestionPipeline::new(
            StaticFetcher(Vec::from(*b"pdf")),
            PagesExtractor(pages(&["some page text"])),
            HashEmbedder::default(),
            index.clone(),
            documents.clone(),
        );

        let document = processing_document(&documents).await;
        pipeline.ingest(&document).await;

        let foreign = pipeline.delete_document(&document.id, "mallory").await;
        assert!(foreign.is_err());

        pipeline
            .delete_document(&document.id, "alice")
            .await
            .unwrap();
        let matches = index.query(&document.id, &[0.0; 128], 5).await.unwrap();
        assert!(matches.is_empty());

        // Deleting again reports NotFound; the namespace removal itself is
        // idempotent.
        let again = pipeline.delete_document(&document.id, "alice").await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn failed_namespace_delete_keeps_document_record() {
        let documents = MemoryDocumentStore::new();
        let pipeline = IngestionPipeline::new(
            StaticFetcher(Vec::from(*b"pdf")),
            PagesExtractor(pages(&["some page text"])),
            HashEmbedder::default(),
            BrokenDeleteIndex {
                inner: MemoryIndex::new(),
            },
            documents.clone(),
        );

        let document = processing_document(&documents).await;
        pipeline.ingest(&document).await;

        let result = pipeline.delete_document(&document.id, "alice").await;
        assert!(result.is_err());

        // The record survives so a later retry can still find the document
        // and reach its vectors.
        let remaining = documents.find_owned(&document.id, "alice").await.unwrap();
        assert!(remaining.is_some());
    }
}
