use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tel_chain::ChainEntry;
use tel_types::Hash;
use tracing::{debug, warn};

use super::{StorageBackend, StorageError, StoreResult};

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: u64 = 8;

/// Upper bound on a single encoded entry.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

struct LogState {
    file: File,
    /// Byte length of the valid prefix of the file.
    len: u64,
    count: usize,
    latest: Option<Hash>,
}

/// Append-only log file of chain entries.
///
/// On-disk format, one frame per entry:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (JSON-encoded ChainEntry)]
/// ```
///
/// A frame cut short at the end of the file is a torn write and is
/// truncated away on open. A CRC mismatch anywhere is reported as
/// corruption.
pub struct FileStorage {
    path: PathBuf,
    state: Mutex<LogState>,
}

impl FileStorage {
    /// Open (or create) the log at `path`, recovering from a torn tail.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        let file_len = file.metadata()?.len();

        let (entries, valid_len) = read_frames(&mut file, file_len)?;
        if valid_len < file_len {
            warn!(
                path = %path.display(),
                valid_len,
                file_len,
                "torn write at end of ledger log; truncating"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        debug!(path = %path.display(), entries = entries.len(), "ledger log opened");
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(LogState {
                file,
                len: valid_len,
                count: entries.len(),
                latest: entries.last().map(|e| e.hash),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, LogState>> {
        self.state.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

impl StorageBackend for FileStorage {
    fn save_entry(&self, entry: &ChainEntry) -> StoreResult<()> {
        self.save_batch(std::slice::from_ref(entry))
    }

    fn save_batch(&self, entries: &[ChainEntry]) -> StoreResult<()> {
        let Some(last) = entries.last() else {
            return Ok(());
        };

        let mut buf = Vec::new();
        for entry in entries {
            encode_frame(entry, &mut buf)?;
        }

        let mut state = self.lock()?;
        let start = state.len;
        if let Err(e) = write_at(&mut state.file, start, &buf) {
            // Drop whatever part of the batch reached the file.
            if let Err(rollback) = state.file.set_len(start) {
                warn!(path = %self.path.display(), error = %rollback, "ledger log rollback failed");
            }
            return Err(e.into());
        }

        state.len = start + buf.len() as u64;
        state.count += entries.len();
        state.latest = Some(last.hash);
        Ok(())
    }

    fn load_all_entries(&self) -> StoreResult<Vec<ChainEntry>> {
        let mut state = self.lock()?;
        let len = state.len;
        let (entries, _) = read_frames(&mut state.file, len)?;
        Ok(entries)
    }

    fn load_entry(&self, hash: &Hash) -> StoreResult<Option<ChainEntry>> {
        Ok(self
            .load_all_entries()?
            .into_iter()
            .find(|e| e.hash == *hash))
    }

    fn entry_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.count)
    }

    fn latest_hash(&self) -> StoreResult<Option<Hash>> {
        Ok(self.lock()?.latest)
    }
}

impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage")
            .field("path", &self.path)
            .finish()
    }
}

fn write_at(file: &mut File, offset: u64, buf: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(buf)?;
    file.sync_data()
}

fn encode_frame(entry: &ChainEntry, buf: &mut Vec<u8>) -> StoreResult<()> {
    let payload =
        serde_json::to_vec(entry).map_err(|e| StorageError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| StorageError::Serialization("entry exceeds maximum frame size".into()))?;
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(())
}

/// Read frames from the start of `file` up to `limit` bytes.
///
/// Returns the decoded entries and the byte length of the complete frames.
fn read_frames(file: &mut File, limit: u64) -> StoreResult<(Vec<ChainEntry>, u64)> {
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut offset = 0u64;

    while offset + HEADER_SIZE <= limit {
        let mut header = [0u8; HEADER_SIZE as usize];
        reader.read_exact(&mut header)?;
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if length == 0 || length > MAX_FRAME_LEN {
            return Err(StorageError::Corrupt {
                offset,
                reason: format!("invalid frame length {length}"),
            });
        }
        if offset + HEADER_SIZE + u64::from(length) > limit {
            break;
        }

        let mut payload = vec![0u8; length as usize];
        reader.read_exact(&mut payload)?;
        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            return Err(StorageError::Corrupt {
                offset,
                reason: format!("CRC mismatch: expected {expected_crc:#010x}, got {actual_crc:#010x}"),
            });
        }

        let entry: ChainEntry =
            serde_json::from_slice(&payload).map_err(|e| StorageError::Corrupt {
                offset,
                reason: e.to_string(),
            })?;
        entries.push(entry);
        offset += HEADER_SIZE + u64::from(length);
    }

    Ok((entries, offset))
}
