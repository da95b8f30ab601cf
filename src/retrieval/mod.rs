
use std::sync::Arc;

use tracing::debug;

use crate::embeddings::Embedder;
use crate::store::{KnowledgeBase, ScoredChunk};
use crate::{RagError, Result};

pub const DEFAULT_TOP_K: usize = 3;

/// Embeds a query and looks up the nearest chunks in a read-only knowledge base
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    knowledge_base: Arc<KnowledgeBase>,
}

impl Retriever {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, knowledge_base: Arc<KnowledgeBase>) -> Self {
        Self {
            embedder,
            knowledge_base,
        }
    }

    #[inline]
    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge_base
    }

    /// Chunk texts nearest to `query`, most similar first
    #[inline]
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .retrieve_scored(query, k)?
            .into_iter()
            .map(|chunk| chunk.text)
            .collect())
    }

    #[inline]
    pub fn retrieve_scored(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if query.trim().is_empty() {
            return Err(RagError::EmptyInput("query is empty".to_string()));
        }
        if self.knowledge_base.is_empty() {
            return Err(RagError::IndexUnavailable);
        }

        let vector = self.embedder.embed(query)?;
        let expected = self.knowledge_base.dimension();
        if vector.len() != expected {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let hits = self.knowledge_base.search(&vector, k)?;
        debug!(
            "Retrieved {} chunks for query (k = {}), nearest distance {:?}",
            hits.len(),
            k,
            hits.first().map(|hit| hit.distance)
        );
        Ok(hits)
    }
}
