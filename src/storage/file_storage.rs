use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use fs2::FileExt;
use log::{debug, error, info, warn};

use crate::data_capture::types::CapturedMessage;
use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::DurableBuffer;
use crate::storage::types::BufferedRecord;

/// Environment variable overriding `storage.path`.
pub const STORAGE_DIR_ENV: &str = "SMS_RELAY_STORAGE_DIR";

const BUFFER_FILE: &str = "incoming_buffer.jsonl";
const CLAIM_FILE: &str = "incoming_buffer.jsonl.draining";
const LOCK_FILE: &str = "incoming_buffer.lock";

/// Durable buffer kept as one JSON record per line.
///
/// Appends go to `incoming_buffer.jsonl`. A drain first renames that file to
/// `incoming_buffer.jsonl.draining`, so appends racing with the drain land in
/// a fresh buffer file instead of the one being read.
///
/// Every operation holds an exclusive `flock` on `incoming_buffer.lock`, so
/// several processes (a fallback-only `receive` next to a running `listen`)
/// can share one directory. The in-process mutex only serializes threads
/// of one instance before they queue on the file lock.
pub struct FileBuffer {
    base_path: PathBuf,
    lock: Mutex<()>,
}

impl FileBuffer {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).map_err(|e| {
            error!("Failed to create buffer dir {}: {}", base_path.display(), e);
            StorageError::WriteFailed
        })?;
        info!("FileBuffer initialized at {}", base_path.display());
        Ok(Self {
            base_path,
            lock: Mutex::new(()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn buffer_path(&self) -> PathBuf {
        self.base_path.join(BUFFER_FILE)
    }

    fn claim_path(&self) -> PathBuf {
        self.base_path.join(CLAIM_FILE)
    }

    /// Takes the in-process mutex, then the cross-process file lock. Both
    /// are released when the returned guard drops.
    fn exclusive(&self) -> Result<BufferLock<'_>, StorageError> {
        let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.base_path.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                error!("Failed to open lock file {}: {}", path.display(), e);
                StorageError::WriteFailed
            })?;
        FileExt::lock_exclusive(&file).map_err(|e| {
            error!("Failed to lock {}: {}", path.display(), e);
            StorageError::WriteFailed
        })?;
        Ok(BufferLock {
            file,
            _guard: guard,
        })
    }

    /// True when `f` is non-empty and its last byte is not a newline, i.e.
    /// a previous writer died in the middle of a record.
    fn has_torn_tail(f: &mut File) -> std::io::Result<bool> {
        if f.metadata()?.len() == 0 {
            return Ok(false);
        }
        f.seek(SeekFrom::End(-1))?;
        let mut last = [0u8; 1];
        f.read_exact(&mut last)?;
        Ok(last[0] != b'\n')
    }

    fn read_records(path: &Path) -> Result<Vec<CapturedMessage>, StorageError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            error!("Failed to read buffer file {}: {}", path.display(), e);
            StorageError::ReadFailed
        })?;
        let mut messages = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<BufferedRecord>(line) {
                Ok(record) => messages.push(record.into_message()),
                // A torn write leaves a partial last line; skip it rather than lose the rest.
                Err(e) => warn!(
                    "Skipping unreadable record at {}:{}: {}",
                    path.display(),
                    lineno + 1,
                    e
                ),
            }
        }
        debug!("Read {} record(s) from {}", messages.len(), path.display());
        Ok(messages)
    }

    fn remove(path: &Path) -> Result<(), StorageError> {
        fs::remove_file(path).map_err(|e| {
            error!("Failed to remove {}: {}", path.display(), e);
            StorageError::WriteFailed
        })
    }
}

impl DurableBuffer for FileBuffer {
    fn append(&self, message: &CapturedMessage) -> Result<(), StorageError> {
        let line = serde_json::to_string(&BufferedRecord::from(message)).map_err(|e| {
            error!("Failed to encode message from {}: {}", message.sender, e);
            StorageError::WriteFailed
        })?;
        let path = self.buffer_path();

        let _lock = self.exclusive()?;
        let mut f = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                error!("Open append failed {}: {}", path.display(), e);
                StorageError::WriteFailed
            })?;
        // Terminate a torn record so this one starts on its own line.
        let torn = Self::has_torn_tail(&mut f).map_err(|e| {
            error!("Failed to inspect tail of {}: {}", path.display(), e);
            StorageError::WriteFailed
        })?;
        if torn {
            warn!("Buffer {} ends in a partial record, closing it off", path.display());
            f.write_all(b"\n").map_err(|e| {
                error!("Write failed {}: {}", path.display(), e);
                StorageError::WriteFailed
            })?;
        }
        writeln!(f, "{}", line).map_err(|e| {
            error!("Write failed {}: {}", path.display(), e);
            StorageError::WriteFailed
        })?;
        f.sync_data().map_err(|e| {
            error!("Sync failed {}: {}", path.display(), e);
            StorageError::WriteFailed
        })?;
        debug!("Buffered message from {} in {}", message.sender, path.display());
        Ok(())
    }

    fn read_and_clear(&self) -> Result<Vec<CapturedMessage>, StorageError> {
        let _lock = self.exclusive()?;
        let claim = self.claim_path();
        let mut messages = Vec::new();

        // A claim file left behind by an interrupted drain holds the oldest records.
        if claim.exists() {
            warn!("Recovering records from interrupted drain {}", claim.display());
            messages.extend(Self::read_records(&claim)?);
            Self::remove(&claim)?;
        }

        let buffer = self.buffer_path();
        if buffer.exists() {
            fs::rename(&buffer, &claim).map_err(|e| {
                error!(
                    "Failed to claim {} as {}: {}",
                    buffer.display(),
                    claim.display(),
                    e
                );
                StorageError::WriteFailed
            })?;
            messages.extend(Self::read_records(&claim)?);
            Self::remove(&claim)?;
        }

        info!("Drained {} buffered message(s)", messages.len());
        Ok(messages)
    }

    fn len(&self) -> Result<usize, StorageError> {
        let _lock = self.exclusive()?;
        Ok(Self::read_records(&self.claim_path())?.len()
            + Self::read_records(&self.buffer_path())?.len())
    }
}

struct BufferLock<'a> {
    file: File,
    _guard: MutexGuard<'a, ()>,
}

impl Drop for BufferLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release buffer lock: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn append_then_drain_preserves_order() {
        let dir = TempDir::new().unwrap();
        let buffer = FileBuffer::new(dir.path()).unwrap();
        for body in ["first", "second", "third"] {
            buffer.append(&CapturedMessage::new("555", body)).unwrap();
        }
        assert_eq!(buffer.len().unwrap(), 3);

        let drained = buffer.read_and_clear().unwrap();
        let bodies: Vec<_> = drained.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second", "third"]);
        assert!(buffer.is_empty().unwrap());
        assert!(buffer.read_and_clear().unwrap().is_empty());
    }

    #[test]
    fn contents_survive_reopening() {
        let dir = TempDir::new().unwrap();
        {
            let buffer = FileBuffer::new(dir.path()).unwrap();
            buffer.append(&CapturedMessage::new("A", "kept")).unwrap();
        }
        let reopened = FileBuffer::new(dir.path()).unwrap();
        let drained = reopened.read_and_clear().unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].body, "kept");
    }

    #[test]
    fn torn_lines_and_legacy_records_are_handled() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(BUFFER_FILE),
            "{\"sender\":\"A\",\"body\":\"legacy\"}\n{\"sender\":\"B\",\"bo",
        )
        .unwrap();
        let buffer = FileBuffer::new(dir.path()).unwrap();
        let drained = buffer.read_and_clear().unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].body, "legacy");
        assert!(!dir.path().join(BUFFER_FILE).exists());
    }

    #[test]
    fn append_after_torn_tail_is_not_lost() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(BUFFER_FILE),
            "{\"sender\":\"A\",\"body\":\"ok\"}\n{\"sender\":\"B\",\"bo",
        )
        .unwrap();
        let buffer = FileBuffer::new(dir.path()).unwrap();
        buffer
            .append(&CapturedMessage::new("C", "after-crash"))
            .unwrap();
        buffer
            .append(&CapturedMessage::new("C", "next"))
            .unwrap();

        let bodies: Vec<_> = buffer
            .read_and_clear()
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies, vec!["ok", "after-crash", "next"]);
    }

    #[test]
    fn two_instances_on_one_directory_lose_nothing() {
        let dir = TempDir::new().unwrap();
        let writer = Arc::new(FileBuffer::new(dir.path()).unwrap());
        let drainer = FileBuffer::new(dir.path()).unwrap();

        let producer = {
            let writer = Arc::clone(&writer);
            std::thread::spawn(move || {
                for i in 0..200 {
                    writer
                        .append(&CapturedMessage::new("W", format!("{}", i)))
                        .unwrap();
                }
            })
        };
        let mut drained = Vec::new();
        while !producer.is_finished() {
            drained.extend(drainer.read_and_clear().unwrap());
        }
        producer.join().unwrap();
        drained.extend(drainer.read_and_clear().unwrap());

        let seq: Vec<u32> = drained.iter().map(|m| m.body.parse().unwrap()).collect();
        assert_eq!(seq, (0..200).collect::<Vec<_>>());
        assert!(writer.is_empty().unwrap());
    }

    #[test]
    fn interrupted_drain_is_recovered_first() {
        let dir = TempDir::new().unwrap();
        let buffer = FileBuffer::new(dir.path()).unwrap();
        buffer.append(&CapturedMessage::new("A", "older")).unwrap();
        fs::rename(dir.path().join(BUFFER_FILE), dir.path().join(CLAIM_FILE)).unwrap();
        buffer.append(&CapturedMessage::new("A", "newer")).unwrap();

        assert_eq!(buffer.len().unwrap(), 2);
        let bodies: Vec<_> = buffer
            .read_and_clear()
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies, vec!["older", "newer"]);
        assert!(!dir.path().join(CLAIM_FILE).exists());
    }

    #[test]
    fn concurrent_appends_are_all_kept() {
        let dir = TempDir::new().unwrap();
        let buffer = Arc::new(FileBuffer::new(dir.path()).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        buffer
                            .append(&CapturedMessage::new(format!("t{}", t), format!("{}", i)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let drained = buffer.read_and_clear().unwrap();
        assert_eq!(drained.len(), 80);
        // per-producer order is preserved
        for t in 0..8 {
            let sender = format!("t{}", t);
            let seq: Vec<_> = drained
                .iter()
                .filter(|m| m.sender == sender)
                .map(|m| m.body.parse::<u32>().unwrap())
                .collect();
            assert_eq!(seq, (0..10).collect::<Vec<_>>());
        }
    }
}
