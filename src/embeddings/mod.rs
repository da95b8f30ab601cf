// Embeddings module
// The embedding seam plus batch helpers with failure substitution and pacing


use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EmbeddingConfig;
use crate::{RagError, Result};

/// Turns text into a fixed-length vector.
///
/// Implementations are blocking; [`embed_many_concurrent`] moves calls onto
/// blocking worker threads.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

impl<T: Embedder + ?Sized> Embedder for Arc<T> {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }
}

impl<T: Embedder + ?Sized> Embedder for &T {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }
}

/// What to do when a single item in a batch cannot be embedded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Log and store a zero vector so rows stay aligned
    #[default]
    ZeroVector,
    /// Attempt everything, then fail naming the failed positions
    Strict,
}

impl std::fmt::Display for FailurePolicy {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroVector => write!(f, "zero-vector"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingOptions {
    pub dimension: usize,
    pub failure_policy: FailurePolicy,
    pub pause_every: usize,
    pub pause: Duration,
    pub concurrency: usize,
}

impl EmbeddingOptions {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::from(&EmbeddingConfig::default())
        }
    }

    #[inline]
    pub const fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    #[inline]
    pub const fn with_pause(mut self, every: usize, pause: Duration) -> Self {
        self.pause_every = every;
        self.pause = pause;
        self
    }

    #[inline]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Whether a pause is due after `processed` of `total` items
    fn pause_due(&self, processed: usize, total: usize) -> bool {
        !self.pause.is_zero() && processed < total && processed % self.pause_every.max(1) == 0
    }

    fn progress_due(&self, processed: usize, total: usize) -> bool {
        processed == total || processed % self.pause_every.max(1) == 0
    }
}

impl From<&EmbeddingConfig> for EmbeddingOptions {
    #[inline]
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            dimension: config.dimension,
            failure_policy: config.failure_policy,
            pause_every: config.pause_every,
            pause: Duration::from_millis(config.pause_ms),
            concurrency: config.concurrency,
        }
    }
}

/// Vectors in input order, with the positions that received a zero vector
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingBatch {
    pub vectors: Vec<Vec<f32>>,
    pub substituted: Vec<usize>,
}

impl EmbeddingBatch {
    #[inline]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Items that were embedded by the remote service
    #[inline]
    pub fn embedded(&self) -> usize {
        self.vectors.len() - self.substituted.len()
    }
}

struct Collector<'a> {
    options: &'a EmbeddingOptions,
    total: usize,
    batch: EmbeddingBatch,
    failed: Vec<usize>,
}

impl<'a> Collector<'a> {
    fn new(options: &'a EmbeddingOptions, total: usize) -> Self {
        Self {
            options,
            total,
            batch: EmbeddingBatch {
                vectors: Vec::with_capacity(total),
                substituted: Vec::new(),
            },
            failed: Vec::new(),
        }
    }

    fn processed(&self) -> usize {
        self.batch.vectors.len() + self.failed.len()
    }

    /// Record the outcome for the next position; returns the processed count
    fn settle(&mut self, outcome: Result<Vec<f32>>) -> usize {
        let position = self.processed();
        let expected = self.options.dimension;
        let outcome = outcome.and_then(|vector| {
            if vector.len() == expected {
                Ok(vector)
            } else {
                Err(RagError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                })
            }
        });

        match (outcome, self.options.failure_policy) {
            (Ok(vector), _) => self.batch.vectors.push(vector),
            (Err(e), FailurePolicy::ZeroVector) => {
                warn!(
                    "Embedding failed for item {}: {}; storing a zero vector",
                    position, e
                );
                self.batch.vectors.push(vec![0.0; expected]);
                self.batch.substituted.push(position);
            }
            (Err(e), FailurePolicy::Strict) => {
                warn!("Embedding failed for item {}: {}", position, e);
                self.failed.push(position);
            }
        }

        let processed = self.processed();
        if self.options.progress_due(processed, self.total) {
            info!("Embedded {}/{} items", processed, self.total);
        }
        processed
    }

    fn finish(self) -> Result<EmbeddingBatch> {
        if !self.failed.is_empty() {
            return Err(RagError::EmbeddingFailures {
                failed: self.failed,
                total: self.total,
            });
        }
        if !self.batch.substituted.is_empty() {
            warn!(
                "{} of {} items were stored as zero vectors",
                self.batch.substituted.len(),
                self.total
            );
        }
        Ok(self.batch)
    }
}

/// Embed `texts` one at a time, in order, pausing between groups of items.
#[inline]
pub fn embed_many<E: Embedder + ?Sized>(
    embedder: &E,
    texts: &[String],
    options: &EmbeddingOptions,
    progress: &ProgressBar,
) -> Result<EmbeddingBatch> {
    debug!("Embedding {} items sequentially", texts.len());
    let mut collector = Collector::new(options, texts.len());

    for text in texts {
        let processed = collector.settle(embedder.embed(text));
        progress.inc(1);
        if options.pause_due(processed, texts.len()) {
            std::thread::sleep(options.pause);
        }
    }

    collector.finish()
}

/// Embed `texts` with at most `options.concurrency` requests in flight.
///
/// Calls run on blocking worker threads; results are settled in input order
/// regardless of which request finishes first.
#[inline]
pub async fn embed_many_concurrent(
    embedder: &Arc<dyn Embedder>,
    texts: Vec<String>,
    options: &EmbeddingOptions,
    progress: &ProgressBar,
) -> Result<EmbeddingBatch> {
    let total = texts.len();
    let concurrency = options.concurrency.max(1);
    debug!(
        "Embedding {} items with up to {} requests in flight",
        total, concurrency
    );

    let mut outcomes = stream::iter(texts.into_iter().map(|text| {
        let embedder = Arc::clone(embedder);
        async move {
            tokio::task::spawn_blocking(move || embedder.embed(&text))
                .await
                .map_err(|e| RagError::Remote(format!("embedding task failed: {}", e)))
                .and_then(std::convert::identity)
        }
    }))
    .buffered(concurrency);

    let mut collector = Collector::new(options, total);
    while let Some(outcome) = outcomes.next().await {
        let processed = collector.settle(outcome);
        progress.inc(1);
        if options.pause_due(processed, total) {
            tokio::time::sleep(options.pause).await;
        }
    }

    collector.finish()
}
