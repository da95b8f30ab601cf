// Chunk store and knowledge base
// Keeps chunk texts aligned with vector index rows, on disk and in memory


use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::index::{FlatIndex, IndexTag, Neighbor};
use crate::{RagError, Result};

pub const CHUNKS_FILE: &str = "chunks.jsonl";
pub const CHUNK_TEXTS_FILE: &str = "chunk_texts.json";
pub const INDEX_FILE: &str = "index.bin";

/// Identifier of a chunk inside a knowledge base; equal to its index row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub usize);

impl std::fmt::Display for ChunkId {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordered chunk texts, persisted as a single JSON array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkStore {
    texts: Vec<String>,
}

impl ChunkStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    #[inline]
    pub fn get(&self, id: ChunkId) -> Option<&str> {
        self.texts.get(id.0).map(String::as_str)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.texts.iter().map(String::as_str)
    }

    /// SHA-256 over every text, length-prefixed so boundaries count
    #[inline]
    pub fn digest(&self) -> IndexTag {
        let mut hasher = Sha256::new();
        for text in &self.texts {
            hasher.update((text.len() as u64).to_le_bytes());
            hasher.update(text.as_bytes());
        }
        hasher.finalize().into()
    }

    fn push(&mut self, text: String) -> ChunkId {
        self.texts.push(text);
        ChunkId(self.texts.len() - 1)
    }

    #[inline]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RagError::MissingIndexFile(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        let store: Self = serde_json::from_reader(reader)?;
        debug!("Loaded {} chunk texts from {}", store.len(), path.display());
        Ok(store)
    }
}

/// A chunk returned from a similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub id: ChunkId,
    pub text: String,
    pub distance: f32,
}

/// Chunk texts paired row-for-row with their vectors.
///
/// The only way to add data is [`KnowledgeBase::insert`], which validates
/// the vector before touching either collection, so the store and the index
/// always have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeBase {
    store: ChunkStore,
    index: FlatIndex,
}

impl KnowledgeBase {
    #[inline]
    pub fn new(dimension: usize) -> Result<Self> {
        Ok(Self {
            store: ChunkStore::new(),
            index: FlatIndex::new(dimension)?,
        })
    }

    /// Pair an existing store and index, rejecting any length disagreement
    #[inline]
    pub fn from_parts(store: ChunkStore, index: FlatIndex) -> Result<Self> {
        if store.len() != index.len() {
            return Err(RagError::DataIntegrity(format!(
                "chunk store holds {} texts but the index holds {} vectors",
                store.len(),
                index.len()
            )));
        }
        Ok(Self { store, index })
    }

    #[inline]
    pub fn insert(&mut self, text: impl Into<String>, vector: &[f32]) -> Result<ChunkId> {
        let row = self.index.add(vector)?;
        let id = self.store.push(text.into());
        debug_assert_eq!(id.0, row);
        Ok(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    #[inline]
    pub const fn dimension(&self) -> usize {
        self.index.dimension()
    }

    #[inline]
    pub const fn store(&self) -> &ChunkStore {
        &self.store
    }

    #[inline]
    pub const fn index(&self) -> &FlatIndex {
        &self.index
    }

    #[inline]
    pub fn text(&self, id: ChunkId) -> Option<&str> {
        self.store.get(id)
    }

    /// Nearest chunks to `query`, nearest first
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        self.index
            .search(query, k)?
            .into_iter()
            .map(|Neighbor { row, distance }| {
                let id = ChunkId(row);
                let text = self.store.get(id).ok_or_else(|| {
                    RagError::DataIntegrity(format!("index row {} has no chunk text", row))
                })?;
                Ok(ScoredChunk {
                    id,
                    text: text.to_string(),
                    distance,
                })
            })
            .collect()
    }

    /// Write the chunk texts and the index into `dir`.
    ///
    /// Both files are written under temporary names first and renamed into
    /// place afterwards, so readers never see a half-written file. The index
    /// header carries the digest of the texts; a texts file left over from
    /// another build is rejected by [`KnowledgeBase::load`].
    #[inline]
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let suffix = Uuid::new_v4().simple().to_string();
        let texts_tmp = dir.join(format!("{}.{}.tmp", CHUNK_TEXTS_FILE, suffix));
        let index_tmp = dir.join(format!("{}.{}.tmp", INDEX_FILE, suffix));

        let written = self
            .store
            .save(&texts_tmp)
            .and_then(|()| self.index.save(&index_tmp, &self.store.digest()));
        if let Err(e) = written {
            let _ = fs::remove_file(&texts_tmp);
            let _ = fs::remove_file(&index_tmp);
            return Err(e);
        }

        fs::rename(&index_tmp, dir.join(INDEX_FILE))?;
        fs::rename(&texts_tmp, dir.join(CHUNK_TEXTS_FILE))?;

        info!(
            "Saved knowledge base with {} chunks to {}",
            self.len(),
            dir.display()
        );
        Ok(())
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let paths = KnowledgeBasePaths::new(dir.as_ref());
        let store = ChunkStore::load(&paths.chunk_texts)?;
        let (index, tag) = FlatIndex::load(&paths.index)?;
        if tag != store.digest() {
            return Err(RagError::DataIntegrity(format!(
                "{} was not written together with {}; rebuild the knowledge base",
                paths.chunk_texts.display(),
                paths.index.display()
            )));
        }
        let kb = Self::from_parts(store, index)?;

        info!(
            "Loaded knowledge base with {} chunks of dimension {} from {}",
            kb.len(),
            kb.dimension(),
            dir.as_ref().display()
        );
        Ok(kb)
    }
}

/// Locations of the persisted pipeline files inside a data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBasePaths {
    pub chunks: PathBuf,
    pub chunk_texts: PathBuf,
    pub index: PathBuf,
}

impl KnowledgeBasePaths {
    #[inline]
    pub fn new(dir: &Path) -> Self {
        Self {
            chunks: dir.join(CHUNKS_FILE),
            chunk_texts: dir.join(CHUNK_TEXTS_FILE),
            index: dir.join(INDEX_FILE),
        }
    }
}
