//! Document storage owned by the host.
//!
//! The engine itself keeps no state between calls. Hosts that need to look
//! documents up later hold a [`DocumentStore`] and pass it to whatever
//! serves the results; [`MemoryDocumentStore`] is the in-process version.

use crate::document::{Document, Table};
use crate::error::DocnormError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Listing entry: everything but the content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: String,
    pub file_name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub processor: String,
    pub success: bool,
    pub page_count: usize,
    pub chunk_count: usize,
    pub table_count: usize,
    pub processed_at: DateTime<Utc>,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            file_name: doc.file_name.clone(),
            content_type: doc.content_type.clone(),
            processor: doc.processor.clone(),
            success: doc.success,
            page_count: doc.metadata.page_count,
            chunk_count: doc.chunks.len(),
            table_count: doc.tables.len(),
            processed_at: doc.processed_at,
        }
    }
}

/// Totals across a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub documents: usize,
    pub successful: usize,
    pub failed: usize,
    pub chunks: usize,
    pub tables: usize,
    pub words: usize,
    /// Document count per processor tag.
    pub by_processor: BTreeMap<String, usize>,
}

/// Key-value store of processed documents, keyed by [`Document::id`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store a document, replacing any with the same id. Returns the id.
    async fn create(&self, document: Document) -> Result<String, DocnormError>;

    async fn get(&self, id: &str) -> Result<Option<Document>, DocnormError>;

    /// Summaries, oldest first.
    async fn list(&self) -> Result<Vec<DocumentSummary>, DocnormError>;

    /// Returns whether a document was removed.
    async fn delete(&self, id: &str) -> Result<bool, DocnormError>;

    /// Tables of one document, `None` if the id is unknown.
    async fn tables(&self, id: &str) -> Result<Option<Vec<Table>>, DocnormError> {
        Ok(self.get(id).await?.map(|d| d.tables))
    }

    async fn stats(&self) -> Result<StoreStats, DocnormError>;
}

/// In-memory [`DocumentStore`]. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<RwLock<HashMap<String, Document>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, document: Document) -> Result<String, DocnormError> {
        let id = document.id.clone();
        let mut documents = self.documents.write().await;
        if documents.insert(id.clone(), document).is_some() {
            debug!("Replaced stored document {}", id);
        }
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, DocnormError> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<DocumentSummary>, DocnormError> {
        let documents = self.documents.read().await;
        let mut summaries: Vec<DocumentSummary> =
            documents.values().map(DocumentSummary::from).collect();
        summaries.sort_by(|a, b| {
            a.processed_at
                .cmp(&b.processed_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(summaries)
    }

    async fn delete(&self, id: &str) -> Result<bool, DocnormError> {
        Ok(self.documents.write().await.remove(id).is_some())
    }

    async fn stats(&self) -> Result<StoreStats, DocnormError> {
        let documents = self.documents.read().await;
        let mut stats = StoreStats::default();
        for doc in documents.values() {
            stats.documents += 1;
            if doc.success {
                stats.successful += 1;
            } else {
                stats.failed += 1;
            }
            stats.chunks += doc.chunks.len();
            stats.tables += doc.tables.len();
            stats.words += doc.metadata.word_count;
            *stats.by_processor.entry(doc.processor.clone()).or_default() += 1;
        }
        Ok(stats)
    }
}
