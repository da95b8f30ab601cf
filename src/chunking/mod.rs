
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RagError, Result};

pub const DEFAULT_MAX_LENGTH: usize = 1000;
pub const DEFAULT_OVERLAP: usize = 200;

/// A window of consecutive words from the source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// The words of the window joined by single spaces
    pub text: String,
    /// Index of the first word (inclusive)
    pub start_word: usize,
    /// Index one past the last word (exclusive)
    pub end_word: usize,
}

impl Chunk {
    #[inline]
    pub const fn word_count(&self) -> usize {
        self.end_word - self.start_word
    }
}

/// Configuration for word-window chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Number of words in each window
    pub max_length: usize,
    /// Number of words shared by adjacent windows
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    /// The window must advance by at least one word per step.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.max_length <= self.overlap {
            return Err(RagError::InvalidConfiguration {
                max_length: self.max_length,
                overlap: self.overlap,
            });
        }
        Ok(())
    }

    #[inline]
    pub const fn stride(&self) -> usize {
        self.max_length - self.overlap
    }
}

/// Lazy sequence of overlapping word windows over a text.
///
/// Cloning yields an independent iterator starting from the same position,
/// so the sequence can be replayed without re-splitting the text.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    words: Vec<&'a str>,
    max_length: usize,
    stride: usize,
    start: usize,
}

impl Chunks<'_> {
    #[inline]
    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.start >= self.words.len() {
            return None;
        }

        let start = self.start;
        let end = start.saturating_add(self.max_length).min(self.words.len());
        self.start = start.saturating_add(self.stride);

        Some(Chunk {
            text: self.words[start..end].join(" "),
            start_word: start,
            end_word: end,
        })
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .words
            .len()
            .saturating_sub(self.start)
            .div_ceil(self.stride);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

/// Split `text` on whitespace into windows of `max_length` words, each
/// starting `max_length - overlap` words after the previous one.
#[inline]
pub fn chunk_text(text: &str, max_length: usize, overlap: usize) -> Result<Chunks<'_>> {
    let config = ChunkingConfig {
        max_length,
        overlap,
    };
    config.validate()?;

    let words: Vec<&str> = text.split_whitespace().collect();
    debug!(
        "Chunking {} words (max_length {}, overlap {})",
        words.len(),
        max_length,
        overlap
    );

    Ok(Chunks {
        words,
        max_length,
        stride: config.stride(),
        start: 0,
    })
}

#[inline]
pub fn chunk_with_config<'a>(text: &'a str, config: &ChunkingConfig) -> Result<Chunks<'a>> {
    chunk_text(text, config.max_length, config.overlap)
}

/// Write chunks as one JSON record per line, returning the number written
#[inline]
pub fn write_chunks<P, I>(path: P, chunks: I) -> Result<usize>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = Chunk>,
{
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    let mut written = 0;

    for chunk in chunks {
        serde_json::to_writer(&mut writer, &chunk)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;

    debug!("Wrote {} chunks to {}", written, path.as_ref().display());
    Ok(written)
}

/// Read chunk records written by [`write_chunks`], skipping blank lines
#[inline]
pub fn read_chunks<P: AsRef<Path>>(path: P) -> Result<Vec<Chunk>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RagError::MissingIndexFile(path.to_path_buf()));
    }

    let reader = BufReader::new(File::open(path)?);
    let mut chunks = Vec::new();

    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let chunk: Chunk = serde_json::from_str(&line)?;
        if chunk.start_word >= chunk.end_word {
            return Err(RagError::DataIntegrity(format!(
                "chunk on line {} has an empty word range {}..{}",
                line_number + 1,
                chunk.start_word,
                chunk.end_word
            )));
        }
        chunks.push(chunk);
    }

    debug!("Read {} chunks from {}", chunks.len(), path.display());
    Ok(chunks)
}
