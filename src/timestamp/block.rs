use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::{Result, SiError, Timestamp};

const HIGH_WATER_FILE: &str = "timestamp.hwm";

/// Durable storage for the oracle's high-water mark.
///
/// Every timestamp the oracle hands out is `<=` the last ceiling that was
/// successfully reserved here, so a restarted oracle can begin strictly above it.
pub trait TimestampBlockManager: Send + Sync {
    /// Last durably reserved ceiling, or 0 if nothing was ever reserved.
    fn initial_timestamp_ceiling(&self) -> Result<Timestamp>;

    /// Durably records `ceiling` as the new high-water mark.
    ///
    /// Must not return `Ok` before the value survives a crash.
    fn reserve_next_block(&self, ceiling: Timestamp) -> Result<()>;
}

/// Volatile block manager, for tests and embedded single-process use.
#[derive(Debug, Default)]
pub struct MemoryBlockManager {
    ceiling: AtomicU64,
}

impl MemoryBlockManager {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ceiling: AtomicU64::new(0),
        }
    }

    /// Starts from an already reserved ceiling, as if restored after a restart.
    #[must_use]
    pub const fn with_ceiling(ceiling: Timestamp) -> Self {
        Self {
            ceiling: AtomicU64::new(ceiling),
        }
    }

    #[must_use]
    pub fn ceiling(&self) -> Timestamp {
        self.ceiling.load(Ordering::SeqCst)
    }
}

impl TimestampBlockManager for MemoryBlockManager {
    fn initial_timestamp_ceiling(&self) -> Result<Timestamp> {
        Ok(self.ceiling())
    }

    fn reserve_next_block(&self, ceiling: Timestamp) -> Result<()> {
        self.ceiling.fetch_max(ceiling, Ordering::SeqCst);
        Ok(())
    }
}

/// Keeps the high-water mark in `<data_dir>/timestamp.hwm` as 8 big-endian bytes.
///
/// Writes go to a temp file which is fsynced and renamed over the old one,
/// so a crash leaves either the old or the new ceiling, never a torn value.
#[derive(Debug)]
pub struct FileBlockManager {
    path: PathBuf,
}

impl FileBlockManager {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;

        Ok(Self {
            path: data_dir.join(HIGH_WATER_FILE),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_ceiling(&self, ceiling: Timestamp) -> std::io::Result<()> {
        let tmp_path = self.path.with_extension("hwm.tmp");
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&ceiling.to_be_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        // fsync the directory so the rename itself is durable
        if let Some(dir) = self.path.parent() {
            if let Ok(dir) = File::open(dir) {
                dir.sync_all()?;
            }
        }
        Ok(())
    }
}

impl TimestampBlockManager for FileBlockManager {
    fn initial_timestamp_ceiling(&self) -> Result<Timestamp> {
        if !self.path.exists() {
            return Ok(0);
        }

        let data = fs::read(&self.path)
            .map_err(|e| SiError::Allocation(format!("cannot read high-water mark: {e}")))?;
        let bytes: [u8; 8] = data.as_slice().try_into().map_err(|_| {
            SiError::Allocation(format!(
                "high-water mark file {} has {} bytes, expected 8",
                self.path.display(),
                data.len()
            ))
        })?;
        Ok(u64::from_be_bytes(bytes))
    }

    fn reserve_next_block(&self, ceiling: Timestamp) -> Result<()> {
        self.write_ceiling(ceiling).map_err(|e| {
            SiError::Allocation(format!("cannot persist high-water mark {ceiling}: {e}"))
        })
    }
}
