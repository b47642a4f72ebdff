//! Partitioned columnar store for encoded edges.
//!
//! A dataset is a directory of `part-NNNNN.edges` files plus `manifest.json`.
//! Each partition holds one encoded batch as two little-endian `i64` columns
//! (sources, then targets) framed by a magic and a CRC32 trailer. The
//! manifest pins the node count and the fingerprint of the title index the
//! ids were assigned against, so a dataset cannot be silently paired with a
//! different index.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{LinkRankError, LinkRankResult};
use crate::indexer::titles::TitleIndex;
use crate::models::EncodedBatch;
use crate::store::binio::{seal, unseal, ByteCursor};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const EDGES_FORMAT_VERSION: u32 = 1;
const PARTITION_MAGIC: &[u8; 4] = b"LRE1";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub id: usize,
    pub file: String,
    pub rows: u64,
    pub checksum: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeManifest {
    pub format_version: u32,
    pub node_count: usize,
    pub index_fingerprint: String,
    pub partitions: Vec<PartitionInfo>,
}

impl EdgeManifest {
    pub fn total_rows(&self) -> u64 {
        self.partitions.iter().map(|p| p.rows).sum()
    }
}

fn partition_file(id: usize) -> String {
    format!("part-{id:05}.edges")
}

fn encode_partition(batch: &EncodedBatch) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + 8 + batch.len() * 16 + 4);
    buf.extend_from_slice(PARTITION_MAGIC);
    buf.extend_from_slice(&(batch.len() as u64).to_le_bytes());
    for id in &batch.sources {
        buf.extend_from_slice(&id.to_le_bytes());
    }
    for id in &batch.targets {
        buf.extend_from_slice(&id.to_le_bytes());
    }
    buf
}

fn decode_partition(bytes: &[u8], what: &str) -> LinkRankResult<(EncodedBatch, u32)> {
    let (body, checksum) = unseal(bytes, PARTITION_MAGIC, what)?;
    let mut cursor = ByteCursor::new(body, what);
    let rows = cursor.len()?;
    cursor.expect_remaining(rows.saturating_mul(16))?;

    let mut batch = EncodedBatch {
        sources: Vec::with_capacity(rows),
        targets: Vec::with_capacity(rows),
    };
    for _ in 0..rows {
        batch.sources.push(cursor.i64()?);
    }
    for _ in 0..rows {
        batch.targets.push(cursor.i64()?);
    }
    Ok((batch, checksum))
}

/// Writes partitions; safe to share between worker threads.
#[derive(Debug)]
pub struct EdgeDatasetWriter {
    dir: PathBuf,
    node_count: usize,
    fingerprint: String,
    next_id: AtomicUsize,
    written: Mutex<Vec<PartitionInfo>>,
}

impl EdgeDatasetWriter {
    /// Creates `dir` if needed. An existing manifest is removed, so a
    /// half-written dataset never looks complete.
    pub fn create(dir: &Path, index: &TitleIndex) -> LinkRankResult<Self> {
        fs::create_dir_all(dir)?;
        let manifest = dir.join(MANIFEST_FILE);
        if manifest.exists() {
            fs::remove_file(&manifest)?;
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            node_count: index.len(),
            fingerprint: index.fingerprint().to_string(),
            next_id: AtomicUsize::new(0),
            written: Mutex::new(Vec::new()),
        })
    }

    pub fn write_batch(&self, batch: &EncodedBatch) -> LinkRankResult<PartitionInfo> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let file = partition_file(id);
        let mut buf = encode_partition(batch);
        let checksum = seal(&mut buf);

        let mut out = fs::File::create(self.dir.join(&file))?;
        out.write_all(&buf)?;
        out.flush()?;

        let info = PartitionInfo {
            id,
            file,
            rows: batch.len() as u64,
            checksum,
        };
        debug!(partition = id, rows = info.rows, "edge partition written");
        self.written.lock().push(info.clone());
        Ok(info)
    }

    /// Write the manifest (partitions in id order) and return it.
    pub fn finish(self) -> LinkRankResult<EdgeManifest> {
        let mut partitions = self.written.into_inner();
        partitions.sort_by_key(|p| p.id);
        let manifest = EdgeManifest {
            format_version: EDGES_FORMAT_VERSION,
            node_count: self.node_count,
            index_fingerprint: self.fingerprint,
            partitions,
        };

        let tmp = self.dir.join(format!("{MANIFEST_FILE}.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(&manifest)?)?;
        fs::rename(&tmp, self.dir.join(MANIFEST_FILE))?;
        info!(
            partitions = manifest.partitions.len(),
            rows = manifest.total_rows(),
            "edge dataset written"
        );
        Ok(manifest)
    }
}

/// Read side of a finished dataset.
#[derive(Clone, Debug)]
pub struct EdgeDataset {
    dir: PathBuf,
    manifest: EdgeManifest,
}

impl EdgeDataset {
    pub fn open(dir: &Path) -> LinkRankResult<Self> {
        let raw = fs::read(dir.join(MANIFEST_FILE))?;
        let manifest: EdgeManifest = serde_json::from_slice(&raw)?;
        if manifest.format_version != EDGES_FORMAT_VERSION {
            return Err(LinkRankError::Corrupt(format!(
                "unsupported edge dataset version {}",
                manifest.format_version
            )));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
        })
    }

    /// Open and require that the dataset was encoded against `index`.
    pub fn open_for(dir: &Path, index: &TitleIndex) -> LinkRankResult<Self> {
        let dataset = Self::open(dir)?;
        dataset.verify_index(index)?;
        Ok(dataset)
    }

    pub fn verify_index(&self, index: &TitleIndex) -> LinkRankResult<()> {
        if self.manifest.index_fingerprint != index.fingerprint() {
            return Err(LinkRankError::IndexMismatch {
                expected: self.manifest.index_fingerprint.clone(),
                found: index.fingerprint().to_string(),
            });
        }
        if self.manifest.node_count != index.len() {
            return Err(LinkRankError::ShapeMismatch {
                expected: self.manifest.node_count,
                found: index.len(),
            });
        }
        Ok(())
    }

    pub fn manifest(&self) -> &EdgeManifest {
        &self.manifest
    }

    pub fn node_count(&self) -> usize {
        self.manifest.node_count
    }

    pub fn partition_count(&self) -> usize {
        self.manifest.partitions.len()
    }

    /// Read partition `idx` (manifest order), verifying its checksum and row count.
    pub fn read_partition(&self, idx: usize) -> LinkRankResult<EncodedBatch> {
        let info = self.manifest.partitions.get(idx).ok_or_else(|| {
            LinkRankError::Corrupt(format!(
                "partition {idx} requested but the manifest lists {}",
                self.partition_count()
            ))
        })?;
        let bytes = fs::read(self.dir.join(&info.file))?;
        let (batch, checksum) = decode_partition(&bytes, &info.file)?;
        if checksum != info.checksum || batch.len() as u64 != info.rows {
            return Err(LinkRankError::Corrupt(format!(
                "{} does not match its manifest entry",
                info.file
            )));
        }
        Ok(batch)
    }

    /// All partitions in manifest order, read lazily.
    pub fn batches(&self) -> impl Iterator<Item = LinkRankResult<EncodedBatch>> + Send + '_ {
        (0..self.partition_count()).map(move |idx| self.read_partition(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SENTINEL_ID;

    fn batch(pairs: &[(i64, i64)]) -> EncodedBatch {
        EncodedBatch {
            sources: pairs.iter().map(|p| p.0).collect(),
            targets: pairs.iter().map(|p| p.1).collect(),
        }
    }

    fn index() -> TitleIndex {
        TitleIndex::from_titles(["A", "B", "C"])
    }

    #[test]
    fn test_write_then_read_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let writer = EdgeDatasetWriter::create(dir.path(), &index()).unwrap();
        writer.write_batch(&batch(&[(0, 1), (1, SENTINEL_ID)])).unwrap();
        writer.write_batch(&batch(&[])).unwrap();
        writer.write_batch(&batch(&[(2, 0)])).unwrap();
        let manifest = writer.finish().unwrap();
        assert_eq!(manifest.partitions.len(), 3);
        assert_eq!(manifest.total_rows(), 3);
        assert_eq!(manifest.partitions[0].file, "part-00000.edges");

        let dataset = EdgeDataset::open_for(dir.path(), &index()).unwrap();
        assert_eq!(dataset.node_count(), 3);
        let first = dataset.read_partition(0).unwrap();
        assert_eq!(first.targets, vec![1, SENTINEL_ID]);
        assert!(dataset.read_partition(1).unwrap().is_empty());
        let all: Vec<EncodedBatch> = dataset.batches().collect::<Result<_, _>>().unwrap();
        assert_eq!(all[2].sources, vec![2]);
        assert!(dataset.read_partition(3).is_err());
    }

    #[test]
    fn test_concurrent_writers_share_ids() {
        use rayon::prelude::*;

        let dir = tempfile::tempdir().unwrap();
        let writer = EdgeDatasetWriter::create(dir.path(), &index()).unwrap();
        (0..16i64).into_par_iter().for_each(|i| {
            writer.write_batch(&batch(&[(i % 3, (i + 1) % 3)])).unwrap();
        });
        let manifest = writer.finish().unwrap();
        let ids: Vec<usize> = manifest.partitions.iter().map(|p| p.id).collect();
        assert_eq!(ids, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_corrupted_partition_detected() {
        let dir = tempfile::tempdir().unwrap();
        let writer = EdgeDatasetWriter::create(dir.path(), &index()).unwrap();
        writer.write_batch(&batch(&[(0, 1), (1, 2)])).unwrap();
        writer.finish().unwrap();

        let path = dir.path().join("part-00000.edges");
        let mut bytes = fs::read(&path).unwrap();
        bytes[14] ^= 0x01;
        fs::write(&path, &bytes).unwrap();

        let dataset = EdgeDataset::open(dir.path()).unwrap();
        assert!(matches!(dataset.read_partition(0), Err(LinkRankError::Corrupt(_))));
    }

    #[test]
    fn test_foreign_index_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let writer = EdgeDatasetWriter::create(dir.path(), &index()).unwrap();
        writer.finish().unwrap();
        let other = TitleIndex::from_titles(["A", "B", "D"]);
        let err = EdgeDataset::open_for(dir.path(), &other).unwrap_err();
        assert!(matches!(err, LinkRankError::IndexMismatch { .. }));
    }

    #[test]
    fn test_unfinished_dataset_has_no_manifest() {
        let dir = tempfile::tempdir().unwrap();
        EdgeDatasetWriter::create(dir.path(), &index())
            .unwrap()
            .finish()
            .unwrap();
        let writer = EdgeDatasetWriter::create(dir.path(), &index()).unwrap();
        writer.write_batch(&batch(&[(0, 0)])).unwrap();
        drop(writer);
        assert!(EdgeDataset::open(dir.path()).is_err());
    }
}
