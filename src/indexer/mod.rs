// Indexer module
// Offline build: chunk the source, embed every chunk, persist the knowledge base


use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chunking::{Chunk, ChunkingConfig, chunk_with_config, read_chunks, write_chunks};
use crate::config::Config;
use crate::embeddings::{EmbeddingOptions, Embedder, embed_many_concurrent};
use crate::store::{CHUNKS_FILE, KnowledgeBase};
use crate::{RagError, Result};

const LOCK_FILE: &str = ".indexer.lock";
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// A lock without a heartbeat for this long belongs to a dead process
const STALE_LOCK_SECS: i64 = 120;

/// Builds the chunk file and knowledge base inside one data directory
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    options: EmbeddingOptions,
    data_dir: PathBuf,
    lock_file_path: PathBuf,
    heartbeat_interval: Duration,
}

/// Statistics about a completed build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingStats {
    pub chunks: usize,
    pub embedded: usize,
    /// Chunk positions stored as zero vectors
    pub substituted: Vec<usize>,
    pub duration: Duration,
}

impl Indexer {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        data_dir: impl Into<PathBuf>,
        chunking: ChunkingConfig,
        options: EmbeddingOptions,
    ) -> Result<Self> {
        chunking.validate()?;
        let data_dir = data_dir.into();

        Ok(Self {
            embedder,
            chunking,
            options,
            lock_file_path: data_dir.join(LOCK_FILE),
            data_dir,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        })
    }

    #[inline]
    pub fn from_config(embedder: Arc<dyn Embedder>, config: &Config) -> Result<Self> {
        Self::new(
            embedder,
            config.data_path(),
            config.chunking,
            EmbeddingOptions::from(&config.embedding),
        )
    }

    #[inline]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[inline]
    pub fn chunks_path(&self) -> PathBuf {
        self.data_dir.join(CHUNKS_FILE)
    }

    /// Split a plain-text source into chunks and write them to `chunks.jsonl`
    #[inline]
    pub fn chunk_source(&self, source: &Path) -> Result<Vec<Chunk>> {
        chunk_source_file(source, &self.data_dir, &self.chunking)
    }

    /// Chunk `source`, then embed and save everything
    #[inline]
    pub async fn index_source(&self, source: &Path) -> Result<IndexingStats> {
        let _lock = self.acquire_lock()?;
        let chunks = self.chunk_source(source)?;
        self.build(chunks).await
    }

    /// Embed and save the chunks already written to `chunks.jsonl`
    #[inline]
    pub async fn index_existing_chunks(&self) -> Result<IndexingStats> {
        let _lock = self.acquire_lock()?;
        let chunks = read_chunks(self.chunks_path())?;
        if chunks.is_empty() {
            return Err(RagError::EmptyInput(format!(
                "{} holds no chunks",
                self.chunks_path().display()
            )));
        }
        self.build(chunks).await
    }

    /// Whether another live process is building in this data directory
    #[inline]
    pub fn is_indexer_running(&self) -> bool {
        lock_is_live(&self.lock_file_path)
    }

    async fn build(&self, chunks: Vec<Chunk>) -> Result<IndexingStats> {
        let started = Instant::now();
        let texts: Vec<String> = chunks.into_iter().map(|chunk| chunk.text).collect();
        info!(
            "Embedding {} chunks with up to {} requests in flight",
            texts.len(),
            self.options.concurrency
        );

        let bar = progress_bar(texts.len());
        let batch = embed_many_concurrent(&self.embedder, texts.clone(), &self.options, &bar).await;
        bar.finish_and_clear();
        let batch = batch?;

        let mut knowledge_base = KnowledgeBase::new(self.options.dimension)?;
        for (text, vector) in texts.into_iter().zip(&batch.vectors) {
            knowledge_base.insert(text, vector)?;
        }
        knowledge_base.save(&self.data_dir)?;

        let stats = IndexingStats {
            chunks: knowledge_base.len(),
            embedded: batch.embedded(),
            substituted: batch.substituted,
            duration: started.elapsed(),
        };
        info!(
            "Indexed {} chunks ({} embedded, {} substituted) in {:?}",
            stats.chunks,
            stats.embedded,
            stats.substituted.len(),
            stats.duration
        );
        Ok(stats)
    }

    /// Create the lock file and start refreshing its heartbeat
    fn acquire_lock(&self) -> Result<IndexLock> {
        fs::create_dir_all(&self.data_dir)?;

        if self.lock_file_path.exists() {
            if self.is_indexer_running() {
                return Err(RagError::Other(anyhow::anyhow!(
                    "another indexer is already running in {}",
                    self.data_dir.display()
                )));
            }
            warn!(
                "Removing stale indexer lock {}",
                self.lock_file_path.display()
            );
            fs::remove_file(&self.lock_file_path)?;
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_file_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(RagError::Other(anyhow::anyhow!(
                    "another indexer started in {}",
                    self.data_dir.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        write!(file, "{}", Utc::now().timestamp())?;
        debug!("Acquired indexer lock {}", self.lock_file_path.display());

        Ok(IndexLock {
            path: self.lock_file_path.clone(),
            heartbeat: start_heartbeat_task(self.lock_file_path.clone(), self.heartbeat_interval),
        })
    }
}

/// Split `source` into chunks and replace `data_dir/chunks.jsonl` with them.
///
/// Needs no model service. Fails with `EmptyInput` and writes nothing when the
/// source has no words.
#[inline]
pub fn chunk_source_file(
    source: &Path,
    data_dir: &Path,
    chunking: &ChunkingConfig,
) -> Result<Vec<Chunk>> {
    info!("Chunking source document {}", source.display());
    let text = fs::read_to_string(source)?;

    let chunks: Vec<Chunk> = chunk_with_config(&text, chunking)?.collect();
    if chunks.is_empty() {
        return Err(RagError::EmptyInput(format!(
            "{} contains no words",
            source.display()
        )));
    }

    fs::create_dir_all(data_dir)?;
    let chunks_path = data_dir.join(CHUNKS_FILE);
    let tmp_path = data_dir.join(format!(
        "{}.{}.tmp",
        CHUNKS_FILE,
        Uuid::new_v4().simple()
    ));
    if let Err(e) = write_chunks(&tmp_path, chunks.iter().cloned()) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    fs::rename(&tmp_path, &chunks_path)?;

    info!(
        "Wrote {} chunks ({} words per chunk, {} overlap) to {}",
        chunks.len(),
        chunking.max_length,
        chunking.overlap,
        chunks_path.display()
    );
    Ok(chunks)
}

/// Whether a live indexer holds the lock in `data_dir`
#[inline]
pub fn indexer_lock_held(data_dir: &Path) -> bool {
    lock_is_live(&data_dir.join(LOCK_FILE))
}

fn lock_is_live(lock_file_path: &Path) -> bool {
    let Ok(content) = fs::read_to_string(lock_file_path) else {
        return false;
    };

    match content.trim().parse::<i64>() {
        Ok(heartbeat) => Utc::now().timestamp() - heartbeat < STALE_LOCK_SECS,
        Err(_) => false,
    }
}

/// Held for the duration of a build; removes the lock file when dropped
struct IndexLock {
    path: PathBuf,
    heartbeat: JoinHandle<()>,
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        self.heartbeat.abort();
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove indexer lock {}: {}", self.path.display(), e);
        }
    }
}

fn start_heartbeat_task(path: PathBuf, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        #[expect(
            clippy::infinite_loop,
            reason = "intended to run until handle is aborted"
        )]
        loop {
            sleep(interval).await;
            // Never recreate a lock that was already released
            let refreshed = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&path)
                .and_then(|mut file| write!(file, "{}", Utc::now().timestamp()));
            if let Err(e) = refreshed {
                error!("Failed to update indexer heartbeat: {}", e);
            }
        }
    })
}

fn progress_bar(len: usize) -> ProgressBar {
    if console::user_attended_stderr() {
        ProgressBar::new(len as u64).with_style(
            ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} Embedding chunks ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        )
    } else {
        ProgressBar::hidden()
    }
}
