//! Snapshot-backed node store.
//!
//! A `MemoryStore` whose committed state is written to `nodes.snap` in a
//! store directory on every commit. The new snapshot is written to a
//! temporary file and renamed over the old one, so a crash leaves either
//! the previous or the new committed state on disk, never a mix.
//!
//! ## Snapshot layout
//!
//! ```text
//! [magic "NSETSNP1": 8 bytes]
//! [format tag: 1 byte]          1 = bincode, 2 = json
//! [blake3(payload): 32 bytes]
//! [payload]                     Snapshot { next_id, nodes }
//! ```
//!
//! Staged writes reach disk only through `commit`, and only become visible
//! in memory once the snapshot rename succeeded. Anything not committed is
//! lost on reopen.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{SnapshotFormat, StoreConfig};
use crate::error::{Result, TreeError};
use crate::storage::memory::MemoryStore;
use crate::storage::{IntervalFilter, NodeRecord, NodeStore};

const SNAPSHOT_FILE: &str = "nodes.snap";
const SNAPSHOT_TMP_FILE: &str = "nodes.snap.tmp";
const MAGIC: &[u8; 8] = b"NSETSNP1";
const HEADER_LEN: usize = 8 + 1 + 32;

#[derive(Serialize, Deserialize)]
struct Snapshot<D> {
    next_id: u64,
    nodes: Vec<NodeRecord<u64, D>>,
}

pub struct FileStore<D> {
    inner: MemoryStore<D>,
    dir: PathBuf,
    config: StoreConfig,
}

impl<D> FileStore<D>
where
    D: Clone + Serialize + DeserializeOwned,
{
    /// Create a new, empty store in `dir`. Fails if a snapshot already exists.
    pub fn create(dir: &Path, config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(dir)?;
        if dir.join(SNAPSHOT_FILE).exists() {
            return Err(TreeError::invalid(format!(
                "store already exists at {}",
                dir.display()
            )));
        }
        config.write_to(dir)?;
        let store = Self {
            inner: MemoryStore::new(),
            dir: dir.to_path_buf(),
            config,
        };
        store.write_snapshot()?;
        Ok(store)
    }

    /// Open an existing store, verifying the snapshot checksum.
    pub fn open(dir: &Path) -> Result<Self> {
        let config = StoreConfig::read_from(dir)?.unwrap_or_default();
        let bytes = fs::read(dir.join(SNAPSHOT_FILE))?;
        let snapshot: Snapshot<D> = decode_snapshot(&bytes)?;
        let count = snapshot.nodes.len();
        let inner = MemoryStore::from_parts(snapshot.nodes, snapshot.next_id)?;
        tracing::info!("opened node store at {} ({} records)", dir.display(), count);
        Ok(Self {
            inner,
            dir: dir.to_path_buf(),
            config,
        })
    }

    /// Open the store in `dir`, creating it with `config` if absent.
    pub fn open_or_create(dir: &Path, config: StoreConfig) -> Result<Self> {
        if dir.join(SNAPSHOT_FILE).exists() {
            Self::open(dir)
        } else {
            Self::create(dir, config)
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of live records, staged writes included.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of staged, uncommitted writes.
    pub fn pending_writes(&self) -> usize {
        self.inner.pending_writes()
    }

    /// Persist the committed state with the staged writes folded in. The
    /// in-memory commit happens only once this has reached disk.
    fn write_snapshot(&self) -> Result<()> {
        let snapshot = Snapshot {
            next_id: self.inner.staged_next_id(),
            nodes: self.inner.merged_records(),
        };
        let bytes = encode_snapshot(&snapshot, self.config.format)?;

        let tmp_path = self.dir.join(SNAPSHOT_TMP_FILE);
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            if self.config.sync_on_commit {
                file.sync_all()?;
            }
        }
        fs::rename(&tmp_path, self.dir.join(SNAPSHOT_FILE))?;
        tracing::info!(
            "wrote snapshot: {} records, {} bytes",
            snapshot.nodes.len(),
            bytes.len()
        );
        Ok(())
    }
}

fn encode_snapshot<D: Serialize>(
    snapshot: &Snapshot<D>,
    format: SnapshotFormat,
) -> Result<Vec<u8>> {
    let payload = match format {
        SnapshotFormat::Bincode => bincode::serialize(snapshot)?,
        SnapshotFormat::Json => serde_json::to_vec(snapshot)?,
    };
    let checksum = blake3::hash(&payload);

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.push(format.tag());
    bytes.extend_from_slice(checksum.as_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

fn decode_snapshot<D: DeserializeOwned>(bytes: &[u8]) -> Result<Snapshot<D>> {
    if bytes.len() < HEADER_LEN {
        return Err(TreeError::InvalidFormat(format!(
            "snapshot truncated: {} bytes",
            bytes.len()
        )));
    }
    if &bytes[0..8] != MAGIC {
        return Err(TreeError::InvalidFormat("bad snapshot magic".to_string()));
    }
    let format = SnapshotFormat::from_tag(bytes[8])
        .ok_or_else(|| TreeError::InvalidFormat(format!("unknown snapshot format {}", bytes[8])))?;
    let payload = &bytes[HEADER_LEN..];
    if blake3::hash(payload).as_bytes() != &bytes[9..HEADER_LEN] {
        return Err(TreeError::InvalidFormat("snapshot checksum mismatch".to_string()));
    }
    let snapshot = match format {
        SnapshotFormat::Bincode => bincode::deserialize(payload)?,
        SnapshotFormat::Json => serde_json::from_slice(payload)?,
    };
    Ok(snapshot)
}

impl<D> NodeStore for FileStore<D>
where
    D: Clone + Serialize + DeserializeOwned,
{
    type Key = u64;
    type Data = D;

    fn get(&self, id: u64) -> Result<NodeRecord<u64, D>> {
        self.inner.get(id)
    }

    fn scan(&self, root_id: u64, filter: &IntervalFilter) -> Result<Vec<NodeRecord<u64, D>>> {
        self.inner.scan(root_id, filter)
    }

    fn roots(&self) -> Result<Vec<NodeRecord<u64, D>>> {
        self.inner.roots()
    }

    fn add_batch(&mut self, nodes: &mut [NodeRecord<u64, D>]) -> Result<()> {
        self.inner.add_batch(nodes)
    }

    fn update_batch(&mut self, nodes: &[NodeRecord<u64, D>]) -> Result<()> {
        self.inner.update_batch(nodes)
    }

    fn remove_batch(&mut self, ids: &[u64]) -> Result<()> {
        self.inner.remove_batch(ids)
    }

    fn commit(&mut self) -> Result<()> {
        if self.inner.pending_writes() > 0 {
            self.write_snapshot()?;
        }
        self.inner.commit()
    }

    fn rollback(&mut self) {
        self.inner.rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_node(name: &str) -> NodeRecord<u64, String> {
        NodeRecord::with_bounds(name.to_string(), 1, 2, 0)
    }

    #[test]
    fn test_create_then_open_empty() {
        let dir = tempdir().unwrap();
        FileStore::<String>::create(dir.path(), StoreConfig::default()).unwrap();

        let store = FileStore::<String>::open(dir.path()).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.config(), &StoreConfig::default());
    }

    #[test]
    fn test_create_refuses_existing_store() {
        let dir = tempdir().unwrap();
        FileStore::<String>::create(dir.path(), StoreConfig::default()).unwrap();
        let again = FileStore::<String>::create(dir.path(), StoreConfig::default());
        assert!(matches!(again, Err(TreeError::InvalidArgument(_))));
    }

    #[test]
    fn test_committed_records_survive_reopen_in_both_formats() {
        for format in [SnapshotFormat::Bincode, SnapshotFormat::Json] {
            let dir = tempdir().unwrap();
            let config = StoreConfig { format, sync_on_commit: false };
            {
                let mut store = FileStore::create(dir.path(), config.clone()).unwrap();
                let mut nodes = vec![make_node("a"), make_node("b")];
                store.add_batch(&mut nodes).unwrap();
                store.commit().unwrap();
            }

            let store = FileStore::<String>::open(dir.path()).unwrap();
            assert_eq!(store.len(), 2);
            assert_eq!(store.get(2).unwrap().data, "b");
            assert_eq!(store.config().format, format);
        }
    }

    #[test]
    fn test_id_sequence_continues_after_reopen() {
        let dir = tempdir().unwrap();
        {
            let mut store = FileStore::create(dir.path(), StoreConfig::default()).unwrap();
            store.add_batch(&mut [make_node("a")]).unwrap();
            store.commit().unwrap();
            store.remove_batch(&[1]).unwrap();
            store.commit().unwrap();
        }
        let mut store = FileStore::<String>::open(dir.path()).unwrap();
        let mut nodes = vec![make_node("b")];
        store.add_batch(&mut nodes).unwrap();
        assert_eq!(nodes[0].id, Some(2), "removed ids are not reused");
    }

    #[test]
    fn test_failed_snapshot_write_does_not_commit() {
        let dir = tempdir().unwrap();
        let mut store = FileStore::create(dir.path(), StoreConfig::default()).unwrap();
        fs::remove_dir_all(dir.path()).unwrap();

        store.add_batch(&mut [make_node("a")]).unwrap();
        assert!(matches!(store.commit(), Err(TreeError::Io(_))));
        assert_eq!(store.pending_writes(), 1);

        store.rollback();
        assert!(store.is_empty());
        assert!(matches!(store.get(1), Err(TreeError::NodeNotFound(_))));
    }

    #[test]
    fn test_corrupted_snapshot_is_rejected() {
        let dir = tempdir().unwrap();
        {
            let mut store = FileStore::create(dir.path(), StoreConfig::default()).unwrap();
            store.add_batch(&mut [make_node("a")]).unwrap();
            store.commit().unwrap();
        }
        let path = dir.path().join(SNAPSHOT_FILE);
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, &bytes).unwrap();

        let result = FileStore::<String>::open(dir.path());
        assert!(matches!(result, Err(TreeError::InvalidFormat(_))));
    }

    #[test]
    fn test_truncated_and_foreign_files_are_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(SNAPSHOT_FILE), b"NSET").unwrap();
        assert!(matches!(
            FileStore::<String>::open(dir.path()),
            Err(TreeError::InvalidFormat(_))
        ));

        fs::write(dir.path().join(SNAPSHOT_FILE), vec![0u8; HEADER_LEN + 4]).unwrap();
        assert!(matches!(
            FileStore::<String>::open(dir.path()),
            Err(TreeError::InvalidFormat(_))
        ));
    }
}
