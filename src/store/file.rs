//! File-backed record store.
//!
//! Layout of a store directory:
//!
//! ```text
//! MANIFEST     magic + format version
//! LOCK         exclusive advisory lock held while open
//! records.log  append-only frames: [len u32][entry][crc32 u32]
//! ```
//!
//! Entries are MessagePack-encoded puts and deletes. Opening the store replays
//! the log into a [`PartitionIndex`]; reclaiming expired items rewrites the log
//! with only the surviving items.

use super::{check_key, PartitionIndex, RecordStore};
use crate::error::{FanlogError, Result};
use crate::time::Timestamp;
use crate::types::{Item, SortKey, Table};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for the store manifest.
const STORE_MAGIC: &[u8; 4] = b"FLG\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

const LOG_FILE: &str = "records.log";
const COMPACT_FILE: &str = "records.log.compact";

/// Largest frame accepted on replay.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// File store configuration.
#[derive(Clone, Debug)]
pub struct FileStoreConfig {
    /// Directory holding the store.
    pub path: PathBuf,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Sync to disk every N writes (0 and 1 both mean every write).
    pub sync_interval: u64,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./fanlog-store"),
            create_if_missing: true,
            sync_interval: 1,
        }
    }
}

#[derive(Serialize, Deserialize)]
enum LogEntry {
    Put {
        table: Table,
        item: Item,
    },
    Delete {
        table: Table,
        partition: String,
        sort: SortKey,
    },
}

/// Append handle for the data log.
struct LogWriter {
    file: File,
    /// Length of the log up to the last acknowledged frame.
    len: u64,
    writes_since_sync: u64,
    /// Set when a failed append could not be rolled back. Every later write
    /// is refused so nothing lands after the damaged tail.
    poisoned: bool,
}

impl LogWriter {
    fn new(file: File, len: u64) -> Self {
        Self {
            file,
            len,
            writes_since_sync: 0,
            poisoned: false,
        }
    }
}

/// Durable record store backed by an append-only log file.
pub struct FileStore {
    config: FileStoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// Live view of every item, rebuilt from the log on open.
    index: RwLock<PartitionIndex>,

    /// Serializes appends; held while the index is updated so readers never
    /// observe an item that is not on disk.
    writer: Mutex<LogWriter>,
}

impl FileStore {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: FileStoreConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(FanlogError::NotInitialized)
        }
    }

    /// Create a new, empty store.
    pub fn create(config: FileStoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(config.path.join(LOG_FILE))?;

        tracing::info!(path = %config.path.display(), "created file store");

        Ok(Self {
            config,
            _lock_file: lock_file,
            index: RwLock::new(PartitionIndex::new()),
            writer: Mutex::new(LogWriter::new(file, 0)),
        })
    }

    /// Open an existing store and replay its log.
    pub fn open(config: FileStoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        let log_path = config.path.join(LOG_FILE);
        let (index, valid_len) = Self::replay(&log_path)?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&log_path)?;

        // Drop a torn frame left by a crash mid-append.
        if file.metadata()?.len() > valid_len {
            tracing::warn!(
                path = %log_path.display(),
                valid_len,
                "truncating incomplete trailing frame"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        drop(file);

        let file = OpenOptions::new().append(true).open(&log_path)?;

        tracing::info!(
            path = %config.path.display(),
            items = index.count(),
            "opened file store"
        );

        Ok(Self {
            config,
            _lock_file: lock_file,
            index: RwLock::new(index),
            writer: Mutex::new(LogWriter::new(file, valid_len)),
        })
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.file.sync_data()?;
        writer.writes_since_sync = 0;
        Ok(())
    }

    /// Number of live items held in the index.
    pub fn len(&self) -> usize {
        self.index.read().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Append one frame and sync per `sync_interval`.
    ///
    /// On failure the log is truncated back to the last acknowledged frame,
    /// so a torn write never sits in front of later ones.
    fn append(&self, writer: &mut LogWriter, entry: &LogEntry) -> Result<()> {
        if writer.poisoned {
            return Err(FanlogError::StoreWrite(
                "log is unwritable after a failed rollback".into(),
            ));
        }
        let frame = encode_frame(entry)?;

        match self.write_frame(writer, &frame) {
            Ok(()) => {
                writer.len += frame.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = writer.file.set_len(writer.len) {
                    tracing::warn!(
                        path = %self.config.path.display(),
                        error = %rollback,
                        "could not roll back failed append; refusing further writes"
                    );
                    writer.poisoned = true;
                }
                Err(e)
            }
        }
    }

    fn write_frame(&self, writer: &mut LogWriter, frame: &[u8]) -> Result<()> {
        // Bytes past the acknowledged length belong to an earlier write that
        // never completed.
        if writer.file.metadata()?.len() > writer.len {
            tracing::warn!(valid_len = writer.len, "dropping unacknowledged log tail");
            writer.file.set_len(writer.len)?;
        }

        writer.file.write_all(frame)?;

        writer.writes_since_sync += 1;
        if writer.writes_since_sync >= self.config.sync_interval.max(1) {
            writer.file.sync_data()?;
            writer.writes_since_sync = 0;
        }
        Ok(())
    }

    /// Rebuild the index from the log. Returns it with the length of the
    /// valid prefix of the file.
    fn replay(path: &Path) -> Result<(PartitionIndex, u64)> {
        let mut index = PartitionIndex::new();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok((index, 0)),
            Err(e) => return Err(e.into()),
        };
        let mut reader = BufReader::new(file);
        let mut valid_len = 0u64;

        loop {
            match read_frame(&mut reader)? {
                Frame::Entry(entry, len) => {
                    match entry {
                        LogEntry::Put { table, item } => {
                            index.insert(table, item);
                        }
                        LogEntry::Delete {
                            table,
                            partition,
                            sort,
                        } => {
                            index.remove(table, &partition, &sort);
                        }
                    }
                    valid_len += len;
                }
                Frame::End => break,
                Frame::Torn => break,
            }
        }

        Ok((index, valid_len))
    }

    /// Rewrite the log so it holds exactly the items in `index`.
    fn rewrite_log(&self, writer: &mut LogWriter, index: &PartitionIndex) -> Result<()> {
        let compact_path = self.config.path.join(COMPACT_FILE);
        let log_path = self.config.path.join(LOG_FILE);

        let mut len = 0u64;
        {
            let mut out = File::create(&compact_path)?;
            for (table, item) in index.iter() {
                let entry = LogEntry::Put {
                    table,
                    item: item.clone(),
                };
                let frame = encode_frame(&entry)?;
                out.write_all(&frame)?;
                len += frame.len() as u64;
            }
            out.sync_all()?;
        }

        fs::rename(&compact_path, &log_path)?;
        *writer = LogWriter::new(OpenOptions::new().append(true).open(&log_path)?, len);
        Ok(())
    }

    fn write_manifest(path: &Path) -> Result<()> {
        let mut file = File::create(path.join("MANIFEST"))?;
        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;
        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let mut file = File::open(path.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(FanlogError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(FanlogError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| FanlogError::Locked)?;
        Ok(lock_file)
    }
}

impl RecordStore for FileStore {
    fn put(&self, table: Table, item: Item) -> Result<()> {
        check_key(&item)?;
        let mut writer = self.writer.lock();
        let entry = LogEntry::Put { table, item };
        self.append(&mut writer, &entry).map_err(FanlogError::into_write)?;

        if let LogEntry::Put { table, item } = entry {
            self.index.write().insert(table, item);
        }
        Ok(())
    }

    fn put_if_absent(&self, table: Table, item: Item) -> Result<bool> {
        check_key(&item)?;
        let mut writer = self.writer.lock();
        if self.index.read().contains(table, &item.partition, &item.sort) {
            return Ok(false);
        }

        let entry = LogEntry::Put { table, item };
        self.append(&mut writer, &entry).map_err(FanlogError::into_write)?;

        if let LogEntry::Put { table, item } = entry {
            self.index.write().insert(table, item);
        }
        Ok(true)
    }

    fn query_range(
        &self,
        table: Table,
        partition: &str,
        after: Option<&SortKey>,
    ) -> Result<Vec<Item>> {
        Ok(self.index.read().range_after(table, partition, after))
    }

    fn last(&self, table: Table, partition: &str) -> Result<Option<Item>> {
        Ok(self.index.read().last(table, partition))
    }

    fn delete(&self, table: Table, partition: &str, sort: &SortKey) -> Result<bool> {
        let mut writer = self.writer.lock();
        if !self.index.read().contains(table, partition, sort) {
            return Ok(false);
        }

        let entry = LogEntry::Delete {
            table,
            partition: partition.to_string(),
            sort: sort.clone(),
        };
        self.append(&mut writer, &entry).map_err(FanlogError::into_write)?;

        self.index.write().remove(table, partition, sort);
        Ok(true)
    }

    fn reclaim_expired(&self, now: Timestamp) -> Result<usize> {
        let mut writer = self.writer.lock();
        let mut index = self.index.write();

        let dropped = index.drain_expired(now);
        if dropped > 0 {
            self.rewrite_log(&mut writer, &index)
                .map_err(FanlogError::into_write)?;
            tracing::debug!(dropped, remaining = index.count(), "compacted file store");
        }
        Ok(dropped)
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}

enum Frame {
    /// A decoded entry and the number of bytes it occupied.
    Entry(LogEntry, u64),
    /// Clean end of file.
    End,
    /// The file ends partway through a frame.
    Torn,
}

fn encode_frame(entry: &LogEntry) -> Result<Vec<u8>> {
    let encoded = rmp_serde::to_vec(entry)?;
    let mut frame = Vec::with_capacity(encoded.len() + 8);
    frame.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
    frame.extend_from_slice(&encoded);
    frame.extend_from_slice(&crc32fast::hash(&encoded).to_le_bytes());
    Ok(frame)
}

fn read_frame(reader: &mut impl Read) -> Result<Frame> {
    let mut len_bytes = [0u8; 4];
    match read_full(reader, &mut len_bytes)? {
        0 => return Ok(Frame::End),
        4 => {}
        _ => return Ok(Frame::Torn),
    }
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FanlogError::Corruption(format!("frame of {len} bytes")));
    }

    let mut encoded = vec![0u8; len];
    if read_full(reader, &mut encoded)? < len {
        return Ok(Frame::Torn);
    }

    let mut checksum_bytes = [0u8; 4];
    if read_full(reader, &mut checksum_bytes)? < 4 {
        return Ok(Frame::Torn);
    }
    let stored = u32::from_le_bytes(checksum_bytes);
    let computed = crc32fast::hash(&encoded);
    if stored != computed {
        return Err(FanlogError::Corruption(format!(
            "log checksum mismatch: expected {stored}, got {computed}"
        )));
    }

    let entry = rmp_serde::from_slice(&encoded)?;
    Ok(Frame::Entry(entry, (len + 8) as u64))
}

/// Read until `buf` is full or EOF. Returns the number of bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
