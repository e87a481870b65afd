use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use super::persistence::{TxnPersistence, accepts_parent, apply_cas_parent, apply_cas_state};
use crate::core::{Result, SiError, Timestamp, TxnId, TxnState};
use crate::transaction::Transaction;

const LOG_FILE: &str = "txn.log";
/// Upper bound on one encoded entry; a larger length prefix is a torn frame
const MAX_ENTRY_LEN: usize = 1 << 20;

/// Запись в логе транзакций: полный образ записи после изменения
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Порядковый номер (LSN)
    pub sequence: u64,
    pub record: Transaction,
}

struct LogState {
    records: HashMap<TxnId, Transaction>,
    file: File,
    sequence: u64,
    /// Length of the well-formed log; appends start here
    len: u64,
    /// Set when a failed append could not be rolled back
    failed: bool,
}

/// Durable transaction persistence backed by an append-only log.
///
/// Every mutation appends the full new record image (`u32` LE length + bincode).
/// On open the log is replayed, last image wins. All operations on the map and
/// the file happen under one lock, so the compare-and-set calls are atomic.
pub struct LogTxnPersistence {
    path: PathBuf,
    state: Mutex<LogState>,
    sync_on_write: bool,
}

impl LogTxnPersistence {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        Self::open_with(data_dir, true)
    }

    /// `sync_on_write = false` skips the per-append fsync (tests, bulk loads).
    pub fn open_with<P: AsRef<Path>>(data_dir: P, sync_on_write: bool) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(LOG_FILE);

        let (entries, valid_len) = if path.exists() {
            Self::read_log(&path)?
        } else {
            (Vec::new(), 0)
        };

        let mut records = HashMap::new();
        let mut sequence = 0;
        for entry in entries {
            sequence = sequence.max(entry.sequence);
            records.insert(entry.record.id, entry.record);
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        // Отрезаем недописанный хвост, иначе следующие записи будут нечитаемы
        if file.metadata()?.len() > valid_len {
            tracing::warn!("Truncating torn transaction log tail at byte {}", valid_len);
            file.set_len(valid_len)?;
        }

        tracing::info!(
            "Transaction log {} replayed: {} records, sequence {}",
            path.display(),
            records.len(),
            sequence
        );

        Ok(Self {
            path,
            state: Mutex::new(LogState {
                records,
                file,
                sequence,
                len: valid_len,
                failed: false,
            }),
            sync_on_write,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    /// Rewrites the log with a single image per transaction.
    ///
    /// Also brings a log that failed to roll back a broken append back into use.
    pub fn compact(&self) -> Result<()> {
        let mut state = self.state.lock();
        let tmp_path = self.path.with_extension("log.tmp");

        let mut len = 0;
        {
            let mut tmp = File::create(&tmp_path).map_err(unavailable)?;
            let mut ids: Vec<_> = state.records.keys().copied().collect();
            ids.sort_unstable();
            for (i, id) in ids.iter().enumerate() {
                let entry = LogEntry {
                    sequence: i as u64 + 1,
                    record: state.records[id].clone(),
                };
                len += Self::write_entry(&mut tmp, &entry)?;
            }
            tmp.sync_all().map_err(unavailable)?;
        }

        fs::rename(&tmp_path, &self.path).map_err(unavailable)?;
        state.file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(unavailable)?;
        state.sequence = state.records.len() as u64;
        state.len = len;
        state.failed = false;
        Ok(())
    }

    fn append(&self, state: &mut LogState, record: &Transaction) -> Result<()> {
        if state.failed {
            return Err(SiError::StoreUnavailable(format!(
                "transaction log {} holds a partial write",
                self.path.display()
            )));
        }

        let entry = LogEntry {
            sequence: state.sequence + 1,
            record: record.clone(),
        };
        let written = Self::write_entry(&mut state.file, &entry).and_then(|written| {
            if self.sync_on_write {
                state.file.sync_data().map_err(unavailable)?;
            }
            Ok(written)
        });

        match written {
            Ok(written) => {
                state.sequence = entry.sequence;
                state.len += written;
                Ok(())
            }
            Err(e) => {
                self.rewind(state);
                Err(e)
            }
        }
    }

    /// Cuts a failed append off the end of the log and reopens the handle.
    fn rewind(&self, state: &mut LogState) {
        let reopened = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .and_then(|file| file.set_len(state.len))
            .and_then(|()| OpenOptions::new().append(true).open(&self.path));

        match reopened {
            Ok(file) => {
                tracing::warn!("Rolled transaction log back to byte {} after a failed append", state.len);
                state.file = file;
            }
            Err(e) => {
                tracing::error!("Transaction log {} cannot be rolled back: {}", self.path.display(), e);
                state.failed = true;
            }
        }
    }

    /// Writes one frame and returns its size in bytes.
    fn write_entry<W: Write>(out: &mut W, entry: &LogEntry) -> Result<u64> {
        let encoded = bincode::serialize(entry)?;
        // Записываем длину (4 байта) + данные одним буфером
        let mut frame = Vec::with_capacity(4 + encoded.len());
        frame.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        frame.extend_from_slice(&encoded);
        out.write_all(&frame).map_err(unavailable)?;
        out.flush().map_err(unavailable)?;
        Ok(frame.len() as u64)
    }

    /// Returns the decodable entries and the byte length of the well-formed prefix.
    fn read_log(path: &Path) -> Result<(Vec<LogEntry>, u64)> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        let mut valid_len = 0u64;

        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_bytes) as usize;
            if len > MAX_ENTRY_LEN {
                tracing::warn!("Transaction log frame claims {} bytes; treating it as torn", len);
                break;
            }
            let mut data = vec![0u8; len];
            match reader.read_exact(&mut data) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            valid_len += 4 + len as u64;

            match bincode::deserialize::<LogEntry>(&data) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Skipping undecodable transaction log entry: {}", e),
            }
        }

        Ok((entries, valid_len))
    }
}

fn unavailable(e: std::io::Error) -> SiError {
    SiError::StoreUnavailable(e.to_string())
}

impl TxnPersistence for LogTxnPersistence {
    fn put_record(&self, id: TxnId, record: &Transaction) -> Result<()> {
        let mut state = self.state.lock();
        self.append(&mut state, record)?;
        state.records.insert(id, record.clone());
        Ok(())
    }

    fn get_record(&self, id: TxnId) -> Result<Option<Transaction>> {
        Ok(self.state.lock().records.get(&id).cloned())
    }

    fn cas_state(
        &self,
        id: TxnId,
        expected: TxnState,
        new: TxnState,
        commit_ts: Option<Timestamp>,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        let mut record = state.records.get(&id).cloned().ok_or(SiError::NotFound(id))?;
        if !apply_cas_state(&mut record, expected, new, commit_ts) {
            return Ok(false);
        }
        // Log first: the map only changes once the new image is durable
        self.append(&mut state, &record)?;
        state.records.insert(id, record);
        Ok(true)
    }

    fn cas_parent(
        &self,
        id: TxnId,
        expected_parent: Option<TxnId>,
        new_parent: Option<TxnId>,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        let mut record = state.records.get(&id).cloned().ok_or(SiError::NotFound(id))?;
        if !accepts_parent(&state.records, id, new_parent)?
            || !apply_cas_parent(&mut record, expected_parent, new_parent)
        {
            return Ok(false);
        }
        self.append(&mut state, &record)?;
        state.records.insert(id, record);
        Ok(true)
    }
}
