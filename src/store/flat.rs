use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::{PapersError, Result};

/// Flat (exhaustive) nearest-neighbor index over fixed-dimension vectors.
///
/// Rows are stored contiguously in insertion order; the position of a
/// vector is its row identifier. Searches scan every row and rank by
/// squared Euclidean distance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlatIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    #[inline]
    pub fn new(dim: usize) -> Self {
        debug_assert!(dim > 0, "index dimensionality must be positive");
        Self {
            dim,
            data: Vec::new(),
        }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of stored rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a batch of rows, preserving order.
    ///
    /// Every row must match the dimensionality fixed at creation time.
    #[inline]
    pub fn add(&mut self, rows: &[Vec<f32>]) -> Result<()> {
        for row in rows {
            if row.len() != self.dim {
                return Err(PapersError::Index(format!(
                    "Vector dimensionality mismatch: expected {}, got {}",
                    self.dim,
                    row.len()
                )));
            }
        }

        for row in rows {
            self.data.extend_from_slice(row);
        }

        Ok(())
    }

    /// Return the `k` nearest rows to `query` by squared Euclidean
    /// distance, closest first. Ties are broken by insertion order. When
    /// fewer than `k` rows exist, all rows are returned.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<(Vec<f32>, Vec<usize>)> {
        if query.len() != self.dim {
            return Err(PapersError::Index(format!(
                "Query dimensionality mismatch: expected {}, got {}",
                self.dim,
                query.len()
            )));
        }

        let mut scored: Vec<(f32, usize)> = self
            .data
            .chunks_exact(self.dim)
            .map(|row| squared_l2(query, row))
            .enumerate()
            .map(|(row_id, dist)| (dist, row_id))
            .collect();

        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);

        Ok(scored.into_iter().unzip())
    }

    /// Serialize the whole index to `path` as a single blob.
    #[inline]
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| {
            PapersError::Index(format!(
                "Failed to create index file {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut writer = BufWriter::new(file);

        bincode::serialize_into(&mut writer, self).map_err(|e| {
            PapersError::Index(format!(
                "Failed to serialize index to {}: {}",
                path.display(),
                e
            ))
        })?;
        writer.flush().map_err(|e| {
            PapersError::Index(format!(
                "Failed to flush index file {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!(
            "Persisted index with {} rows to {}",
            self.len(),
            path.display()
        );
        Ok(())
    }

    /// Deserialize an index previously written by [`save`](Self::save).
    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            PapersError::Index(format!("Failed to open index file {}: {}", path.display(), e))
        })?;

        let index: Self = bincode::deserialize_from(BufReader::new(file)).map_err(|e| {
            PapersError::Index(format!(
                "Failed to deserialize index from {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!(
            "Loaded index with {} rows from {}",
            index.len(),
            path.display()
        );
        Ok(index)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).fold(0.0, |acc, (x, y)| {
        let diff = x - y;
        diff.mul_add(diff, acc)
    })
}
