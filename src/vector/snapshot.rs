//! Durable index snapshots.
//!
//! A snapshot is a directory holding two files:
//!
//! - `vectors.bin`: the generation's entries in a flat binary layout
//! - `metadata.json`: model name, dimension, entry count and timestamps
//!
//! # Storage Format
//!
//! `vectors.bin` starts with a 16-byte header (magic, version, dimension,
//! entry count), followed by one record per position in order:
//! a little-endian `u32` project id and `dimension` little-endian `f32`s.
//!
//! Both files are written to a temporary file in the same directory and
//! renamed into place, so a reader never sees a partially written file.

use crate::ProjectId;
use crate::error::{IndexError, IndexResult};
use crate::vector::{Generation, VectorDimension};
use chrono::{DateTime, Utc};
use memmap2::MmapOptions;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Current snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

/// Size of the vectors file header in bytes.
const HEADER_SIZE: usize = 16;

/// Magic bytes to identify snapshot vector files.
const MAGIC_BYTES: &[u8; 4] = b"PVEC";

const BYTES_PER_F32: usize = 4;
const BYTES_PER_ID: usize = 4;

const VECTORS_FILE: &str = "vectors.bin";
const METADATA_FILE: &str = "metadata.json";

/// Metadata stored next to the vectors file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Name of the embedding model that produced the vectors
    pub model_name: String,

    /// Dimension of each vector
    pub dimension: usize,

    /// Number of entries in the snapshot
    pub entry_count: usize,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Version of the snapshot format
    pub version: u32,
}

impl SnapshotMetadata {
    pub fn new(model_name: String, dimension: usize, entry_count: usize) -> Self {
        let now = Utc::now();
        Self {
            model_name,
            dimension,
            entry_count,
            created_at: now,
            updated_at: now,
            version: SNAPSHOT_VERSION,
        }
    }

    /// Update the entry count and timestamp, keeping the creation time
    pub fn update(&mut self, model_name: String, dimension: usize, entry_count: usize) {
        self.model_name = model_name;
        self.dimension = dimension;
        self.entry_count = entry_count;
        self.updated_at = Utc::now();
    }
}

/// A generation read back from disk together with its metadata.
#[derive(Debug)]
pub struct LoadedSnapshot {
    pub generation: Generation,
    pub metadata: SnapshotMetadata,
}

/// Snapshot directory for one index.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Check if both snapshot files exist
    pub fn exists(&self) -> bool {
        self.vectors_path().exists() && self.metadata_path().exists()
    }

    fn vectors_path(&self) -> PathBuf {
        self.dir.join(VECTORS_FILE)
    }

    fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// Read only the metadata file.
    pub fn read_metadata(&self) -> IndexResult<SnapshotMetadata> {
        let path = self.metadata_path();
        let json = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IndexError::SnapshotNotFound {
                    path: self.dir.clone(),
                }
            } else {
                self.corrupt(format!("failed to read metadata: {e}"))
            }
        })?;

        let metadata: SnapshotMetadata = serde_json::from_str(&json)
            .map_err(|e| self.corrupt(format!("failed to parse metadata: {e}")))?;

        if metadata.version != SNAPSHOT_VERSION {
            return Err(self.corrupt(format!(
                "metadata version {} does not match supported version {SNAPSHOT_VERSION}",
                metadata.version
            )));
        }

        Ok(metadata)
    }

    /// Write a generation and its metadata.
    pub fn save(&self, generation: &Generation, model_name: &str) -> IndexResult<SnapshotMetadata> {
        std::fs::create_dir_all(&self.dir).map_err(|source| IndexError::SnapshotWrite {
            path: self.dir.clone(),
            source,
        })?;

        self.write_vectors(generation)?;

        let dimension = generation.dimension().get();
        let metadata = match self.read_metadata() {
            Ok(mut existing) => {
                existing.update(model_name.to_string(), dimension, generation.len());
                existing
            }
            Err(_) => SnapshotMetadata::new(model_name.to_string(), dimension, generation.len()),
        };

        let json = serde_json::to_string_pretty(&metadata).map_err(|e| {
            IndexError::SnapshotWrite {
                path: self.metadata_path(),
                source: std::io::Error::other(e),
            }
        })?;
        self.write_atomically(&self.metadata_path(), json.as_bytes())?;

        tracing::debug!(
            "Saved snapshot with {} entries to {}",
            generation.len(),
            self.dir.display()
        );
        Ok(metadata)
    }

    fn write_vectors(&self, generation: &Generation) -> IndexResult<()> {
        let dim = generation.dimension().get();
        let mut bytes =
            Vec::with_capacity(HEADER_SIZE + generation.len() * (BYTES_PER_ID + dim * BYTES_PER_F32));

        bytes.extend_from_slice(MAGIC_BYTES);
        bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(dim as u32).to_le_bytes());
        bytes.extend_from_slice(&(generation.len() as u32).to_le_bytes());

        for (id, vector) in generation.entries() {
            bytes.extend_from_slice(&id.to_bytes());
            for &value in vector {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }

        self.write_atomically(&self.vectors_path(), &bytes)
    }

    fn write_atomically(&self, target: &Path, bytes: &[u8]) -> IndexResult<()> {
        let write_err = |source: std::io::Error| IndexError::SnapshotWrite {
            path: target.to_path_buf(),
            source,
        };

        let temp = tempfile::NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            writer.write_all(bytes).map_err(write_err)?;
            writer.flush().map_err(write_err)?;
        }
        temp.as_file().sync_all().map_err(write_err)?;
        temp.persist(target).map_err(|e| write_err(e.error))?;
        Ok(())
    }

    /// Read the snapshot back.
    ///
    /// Missing files give `SnapshotNotFound`; anything malformed gives
    /// `SnapshotCorrupt`.
    pub fn load(&self) -> IndexResult<LoadedSnapshot> {
        let metadata = self.read_metadata()?;

        let path = self.vectors_path();
        let file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IndexError::SnapshotNotFound {
                    path: self.dir.clone(),
                }
            } else {
                self.corrupt(format!("failed to open vectors file: {e}"))
            }
        })?;

        let file_len = file
            .metadata()
            .map_err(|e| self.corrupt(format!("failed to stat vectors file: {e}")))?
            .len() as usize;
        if file_len < HEADER_SIZE {
            return Err(self.corrupt("file too small to contain header".to_string()));
        }

        let mmap = unsafe { MmapOptions::new().map(&file) }
            .map_err(|e| self.corrupt(format!("failed to map vectors file: {e}")))?;

        if &mmap[0..4] != MAGIC_BYTES {
            return Err(self.corrupt("invalid magic bytes".to_string()));
        }

        let version = read_u32(&mmap, 4);
        if version != SNAPSHOT_VERSION {
            return Err(self.corrupt(format!(
                "vectors version {version} does not match supported version {SNAPSHOT_VERSION}"
            )));
        }

        let dimension = VectorDimension::new(read_u32(&mmap, 8) as usize)
            .map_err(|e| self.corrupt(e.to_string()))?;
        let count = read_u32(&mmap, 12) as usize;
        let dim = dimension.get();
        // Header fields come from disk; sizes that overflow are corrupt.
        let expected_len = dim
            .checked_mul(BYTES_PER_F32)
            .and_then(|bytes| bytes.checked_add(BYTES_PER_ID))
            .and_then(|record| record.checked_mul(count))
            .and_then(|body| body.checked_add(HEADER_SIZE))
            .ok_or_else(|| {
                self.corrupt(format!(
                    "header describes {count} entries of dimension {dim}, which cannot fit in {file_len} bytes"
                ))
            })?;
        let record_size = BYTES_PER_ID + dim * BYTES_PER_F32;

        if mmap.len() != expected_len {
            return Err(self.corrupt(format!(
                "expected {expected_len} bytes for {count} entries, found {}",
                mmap.len()
            )));
        }

        if metadata.dimension != dim || metadata.entry_count != count {
            return Err(self.corrupt(format!(
                "metadata describes {} entries of dimension {}, vectors file has {count} of dimension {dim}",
                metadata.entry_count, metadata.dimension
            )));
        }

        let mut ids = Vec::with_capacity(count);
        let mut vectors = Vec::with_capacity(count * dim);
        for record in mmap[HEADER_SIZE..].chunks_exact(record_size) {
            let id = ProjectId::from_bytes([record[0], record[1], record[2], record[3]])
                .ok_or_else(|| self.corrupt("invalid project id 0".to_string()))?;
            ids.push(id);
            vectors.extend(
                record[BYTES_PER_ID..]
                    .chunks_exact(BYTES_PER_F32)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            );
        }

        let generation = Generation::from_parts(dimension, ids, vectors)
            .map_err(|e| self.corrupt(e.to_string()))?
            .with_built_at(metadata.updated_at);

        Ok(LoadedSnapshot {
            generation,
            metadata,
        })
    }

    fn corrupt(&self, reason: String) -> IndexError {
        IndexError::SnapshotCorrupt {
            path: self.dir.clone(),
            reason,
        }
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
