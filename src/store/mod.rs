pub mod flat;


use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{PapersError, Result};

pub use flat::FlatIndex;

/// One metadata record per accepted chunk, in vector-insertion order: the
/// i-th record describes the i-th row of the vector index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkRecord {
    pub file: String,
    pub section: String,
    pub chunk: String,
}

/// Paired vector-index and metadata-log storage.
///
/// Loading is explicit: both artifacts are read at most once and cached
/// for the lifetime of the store. The index builder owns a store
/// exclusively while building; query paths open it read-only.
pub struct IndexStore {
    index_path: PathBuf,
    metadata_path: PathBuf,
    index: Option<FlatIndex>,
    metadata: Option<Vec<ChunkRecord>>,
}

impl IndexStore {
    #[inline]
    pub fn new(index_path: PathBuf, metadata_path: PathBuf) -> Self {
        Self {
            index_path,
            metadata_path,
            index: None,
            metadata: None,
        }
    }

    #[inline]
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    #[inline]
    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    /// Whether both artifacts already exist on disk.
    #[inline]
    pub fn artifacts_exist(&self) -> bool {
        self.index_path.exists() && self.metadata_path.exists()
    }

    /// Delete both artifacts and drop any cached state.
    #[inline]
    pub fn remove_artifacts(&mut self) -> Result<()> {
        if self.index_path.exists() {
            fs::remove_file(&self.index_path).map_err(|e| {
                PapersError::Index(format!(
                    "Failed to remove index file {}: {}",
                    self.index_path.display(),
                    e
                ))
            })?;
        }
        if self.metadata_path.exists() {
            fs::remove_file(&self.metadata_path).map_err(|e| {
                PapersError::Index(format!(
                    "Failed to remove metadata file {}: {}",
                    self.metadata_path.display(),
                    e
                ))
            })?;
        }

        self.index = None;
        self.metadata = None;
        debug!("Removed existing index artifacts");
        Ok(())
    }

    /// Cache a freshly built index so the building process can serve
    /// queries without re-reading the blob it just wrote.
    #[inline]
    pub fn cache_index(&mut self, index: FlatIndex) {
        self.index = Some(index);
    }

    /// Load the persisted index, caching it for the process lifetime.
    ///
    /// A missing index file is fatal for the query session.
    #[inline]
    pub fn load_index(&mut self) -> Result<&FlatIndex> {
        if self.index.is_none() {
            if !self.index_path.exists() {
                return Err(PapersError::Index(format!(
                    "Vector index not found: {} (build the index first)",
                    self.index_path.display()
                )));
            }

            let index = FlatIndex::load(&self.index_path)?;
            info!(
                "Loaded vector index with {} rows from {}",
                index.len(),
                self.index_path.display()
            );
            self.index = Some(index);
        }

        self.index
            .as_ref()
            .ok_or_else(|| PapersError::Index("Vector index cache is empty".to_string()))
    }

    /// Load the metadata log into an ordered record list, caching it for
    /// the process lifetime. List position equals index row identifier.
    #[inline]
    pub fn load_metadata(&mut self) -> Result<&[ChunkRecord]> {
        if self.metadata.is_none() {
            if !self.metadata_path.exists() {
                return Err(PapersError::Index(format!(
                    "Metadata file not found: {} (build the index first)",
                    self.metadata_path.display()
                )));
            }

            let file = File::open(&self.metadata_path)?;
            let mut records = Vec::new();
            for (line_number, line) in BufReader::new(file).lines().enumerate() {
                let line = line?;
                let record: ChunkRecord = serde_json::from_str(&line).map_err(|e| {
                    PapersError::Index(format!(
                        "Invalid metadata record at line {} in {}: {}",
                        line_number + 1,
                        self.metadata_path.display(),
                        e
                    ))
                })?;
                records.push(record);
            }

            info!(
                "Loaded {} metadata records from {}",
                records.len(),
                self.metadata_path.display()
            );
            self.metadata = Some(records);
        }

        self.metadata
            .as_deref()
            .ok_or_else(|| PapersError::Index("Metadata cache is empty".to_string()))
    }

    /// Retrieve the `top_k` nearest rows for a query vector.
    #[inline]
    pub fn retrieve(&mut self, query: &[f32], top_k: usize) -> Result<(Vec<f32>, Vec<usize>)> {
        let index = self.load_index()?;
        index.search(query, top_k)
    }
}

/// Append-only writer for the metadata log.
///
/// The log is truncated on creation; each record is flushed as soon as it
/// is appended so the record count tracks the accepted-vector count even
/// if the build is interrupted.
pub struct MetadataWriter {
    writer: BufWriter<File>,
}

impl MetadataWriter {
    #[inline]
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| {
            PapersError::Index(format!(
                "Failed to create metadata file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    #[inline]
    pub fn append(&mut self, record: &ChunkRecord) -> Result<()> {
        let line = serde_json::to_string(record).map_err(|e| {
            PapersError::Index(format!("Failed to serialize metadata record: {}", e))
        })?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }

    #[inline]
    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Resolve retrieved row identifiers against the loaded metadata records.
///
/// Identifiers outside the record range are dropped rather than allowed to
/// panic; a drop indicates index/metadata drift (for example from an
/// interrupted build) and is logged.
#[inline]
pub fn resolve_records<'a>(records: &'a [ChunkRecord], row_ids: &[usize]) -> Vec<&'a ChunkRecord> {
    let resolved: Vec<&ChunkRecord> = row_ids
        .iter()
        .filter(|&&row_id| row_id < records.len())
        .map(|&row_id| &records[row_id])
        .collect();

    let dropped = row_ids.len() - resolved.len();
    if dropped > 0 {
        warn!(
            "Dropped {} row identifiers outside the metadata range; the index and metadata may be out of sync (rebuild recommended)",
            dropped
        );
    }

    resolved
}
