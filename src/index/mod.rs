// Flat vector index
// Exact nearest-neighbour search over row-major f32 vectors

#[cfg(test)]
mod tests;

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::{RagError, Result};

const INDEX_MAGIC: &[u8; 8] = b"SRAGIDX2";
pub const TAG_LEN: usize = 32;
const HEADER_LEN: usize = INDEX_MAGIC.len() + 4 + 8 + TAG_LEN;

/// Fingerprint of whatever the index rows are paired with, stored in the
/// file header so a reader can tell whether a companion file belongs to it
pub type IndexTag = [u8; TAG_LEN];

/// A search hit: the row the vector was appended at and its squared L2
/// distance from the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    pub distance: f32,
}

/// Append-only collection of fixed-length vectors searched by exact
/// squared Euclidean distance.
///
/// Row numbers are assigned in append order starting at zero and never
/// change, so they can be used as stable keys into a parallel store.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    #[inline]
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::Config(
                "vector dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    /// Build an index from vectors that must all share the first vector's length
    #[inline]
    pub fn build<I>(vectors: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<f32>>,
    {
        let mut vectors = vectors.into_iter().peekable();
        let Some(first) = vectors.peek() else {
            return Err(RagError::EmptyInput(
                "cannot build an index from zero vectors".to_string(),
            ));
        };

        let mut index = Self::new(first.len())?;
        for vector in vectors {
            index.add(&vector)?;
        }

        debug!(
            "Built flat index with {} rows of dimension {}",
            index.len(),
            index.dimension
        );
        Ok(index)
    }

    #[inline]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Append a vector, returning its row number
    #[inline]
    pub fn add(&mut self, vector: &[f32]) -> Result<usize> {
        self.check_dimension(vector)?;
        let row = self.len();
        self.data.extend_from_slice(vector);
        Ok(row)
    }

    #[inline]
    pub fn row(&self, row: usize) -> Option<&[f32]> {
        let start = row.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    #[inline]
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension)
    }

    /// Return the `k` rows nearest to `query`, nearest first.
    ///
    /// Equal distances keep insertion order. Asking for more rows than the
    /// index holds returns every row.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_dimension(query)?;

        let mut neighbors: Vec<Neighbor> = self
            .rows()
            .enumerate()
            .map(|(row, vector)| Neighbor {
                row,
                distance: squared_l2(query, vector),
            })
            .collect();

        // Stable sort keeps ties in row order
        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        neighbors.truncate(k);

        Ok(neighbors)
    }

    /// Serialize as `magic | u32 dimension | u64 rows | tag | f32 payload`,
    /// little endian
    #[inline]
    pub fn to_bytes(&self, tag: &IndexTag) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(HEADER_LEN + std::mem::size_of_val(self.data.as_slice()));
        bytes.extend_from_slice(INDEX_MAGIC);
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        bytes.extend_from_slice(tag);
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, IndexTag)> {
        let Some((magic, rest)) = bytes.split_first_chunk::<8>() else {
            return Err(corrupt("file is shorter than the header"));
        };
        if magic != INDEX_MAGIC {
            return Err(corrupt("unrecognized file signature"));
        }
        let Some((dimension, rest)) = rest.split_first_chunk::<4>() else {
            return Err(corrupt("file is shorter than the header"));
        };
        let Some((rows, rest)) = rest.split_first_chunk::<8>() else {
            return Err(corrupt("file is shorter than the header"));
        };
        let Some((tag, payload)) = rest.split_first_chunk::<TAG_LEN>() else {
            return Err(corrupt("file is shorter than the header"));
        };

        let dimension = u32::from_le_bytes(*dimension) as usize;
        let rows = usize::try_from(u64::from_le_bytes(*rows))
            .map_err(|_| corrupt("row count does not fit in memory"))?;

        let expected_len = rows
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
            .ok_or_else(|| corrupt("payload length overflows"))?;
        if payload.len() != expected_len {
            return Err(corrupt(&format!(
                "expected {} payload bytes for {} rows of dimension {}, found {}",
                expected_len,
                rows,
                dimension,
                payload.len()
            )));
        }

        let mut index = Self::new(dimension).map_err(|_| corrupt("dimension is zero"))?;
        index.data = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok((index, *tag))
    }

    #[inline]
    pub fn save<P: AsRef<Path>>(&self, path: P, tag: &IndexTag) -> Result<()> {
        fs::write(path.as_ref(), self.to_bytes(tag))?;
        debug!(
            "Saved {} index rows to {}",
            self.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<(Self, IndexTag)> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RagError::MissingIndexFile(path.to_path_buf()));
        }
        let (index, tag) = Self::from_bytes(&fs::read(path)?)?;
        debug!("Loaded {} index rows from {}", index.len(), path.display());
        Ok((index, tag))
    }
}

/// Squared Euclidean distance; callers guarantee equal lengths
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Scale a vector to unit length so L2 ranking matches cosine ranking.
/// Zero vectors are left unchanged.
#[inline]
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

fn corrupt(reason: &str) -> RagError {
    RagError::DataIntegrity(format!("corrupt index file: {}", reason))
}
