//! Durable, append-only CSV log with a fixed column layout.
//!
//! Each row is encoded on its own and written to storage in one piece. A row
//! that fails part way is cut back off the end of the file, so the log only
//! ever holds complete rows and a failed record never shows up later.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::config::Durability;
use crate::error::{AppendError, CaptureError, Result};
use crate::records::LogRecord;

/// Byte storage underneath a log.
pub trait LogStorage: Write + Send {
    /// Push written bytes through to the device.
    fn sync_to_disk(&mut self) -> io::Result<()>;

    /// Drop everything past `len` bytes and continue writing from there.
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl LogStorage for File {
    fn sync_to_disk(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len))?;
        Ok(())
    }
}

struct OpenLog {
    storage: Box<dyn LogStorage>,
    /// Length of the complete rows written so far.
    committed: u64,
    /// Cleared when a failed row could not be cut back off the file.
    intact: bool,
}

/// Append-only log for records of type `R`.
///
/// Appends are serialized by an internal mutex, so the writer can be shared
/// across delivery threads. Every append is flushed to the OS before it
/// returns; with [`Durability::Fsync`] it is also synced to disk. A failed
/// append is never retried.
pub struct DurableLogWriter<R> {
    path: PathBuf,
    durability: Durability,
    log: Mutex<Option<OpenLog>>,
    _record: PhantomData<fn(&R)>,
}

impl<R: LogRecord> DurableLogWriter<R> {
    /// Create (or truncate) `path` and write the header row.
    pub fn initialize(path: impl Into<PathBuf>, durability: Durability) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path).map_err(|e| CaptureError::io(&path, e))?;
        Self::with_storage(path, Box::new(file), durability)
    }

    /// Start a log on already opened, empty storage. `path` names the log in errors.
    pub fn with_storage(
        path: impl Into<PathBuf>,
        mut storage: Box<dyn LogStorage>,
        durability: Durability,
    ) -> Result<Self> {
        let path = path.into();
        let header = encode_header(R::HEADER).map_err(|e| CaptureError::io(&path, e))?;
        storage
            .write_all(&header)
            .and_then(|()| storage.flush())
            .map_err(|e| CaptureError::io(&path, e))?;

        log::debug!("Initialized log {} ({} columns)", path.display(), R::HEADER.len());

        Ok(Self {
            path,
            durability,
            log: Mutex::new(Some(OpenLog {
                storage,
                committed: header.len() as u64,
                intact: true,
            })),
            _record: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    pub fn append(&self, record: &R) -> Result<()> {
        let mut guard = self.lock();
        self.write_locked(&mut guard, record)
    }

    /// Build and append a record while holding the writer lock.
    ///
    /// Values captured inside `build` (such as a timestamp) are therefore in
    /// the same order as the rows in the log, even with concurrent callers.
    pub fn append_with<F>(&self, build: F) -> Result<()>
    where
        F: FnOnce() -> R,
    {
        let mut guard = self.lock();
        let record = build();
        self.write_locked(&mut guard, &record)
    }

    fn write_locked(&self, guard: &mut MutexGuard<'_, Option<OpenLog>>, record: &R) -> Result<()> {
        let result = match guard.as_mut() {
            Some(log) => encode_row(record).and_then(|row| self.write_row(log, &row)),
            None => Err(AppendError::SinkClosed),
        };

        result.map_err(|cause| CaptureError::Persistence {
            sink: self.path.clone(),
            record: format!("{record:?}"),
            cause,
        })
    }

    fn write_row(&self, log: &mut OpenLog, row: &[u8]) -> std::result::Result<(), AppendError> {
        if !log.intact {
            return Err(AppendError::Abandoned);
        }

        let written = log
            .storage
            .write_all(row)
            .and_then(|()| log.storage.flush())
            .and_then(|()| match self.durability {
                Durability::Fsync => log.storage.sync_to_disk(),
                Durability::Flush => Ok(()),
            });

        match written {
            Ok(()) => {
                log.committed += row.len() as u64;
                log::trace!("Appended {} bytes to {}", row.len(), self.path.display());
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = log.storage.truncate_to(log.committed) {
                    log::error!(
                        "Could not remove a partial row from {}: {}; no further rows will be written",
                        self.path.display(),
                        rollback
                    );
                    log.intact = false;
                }
                Err(AppendError::Io(e))
            }
        }
    }

    /// Flush and close the log. Later calls are no-ops.
    pub fn close(&self) -> Result<()> {
        let Some(mut log) = self.lock().take() else {
            return Ok(());
        };

        log.storage
            .flush()
            .and_then(|()| log.storage.sync_to_disk())
            .map_err(|e| CaptureError::io(&self.path, e))?;

        log::debug!("Closed log {}", self.path.display());
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Option<OpenLog>> {
        // A panic mid-append leaves at worst a partial row; keep logging.
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn encoder() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new())
}

fn encode_header(header: &[&str]) -> io::Result<Vec<u8>> {
    let mut encoder = encoder();
    encoder.write_record(header)?;
    encoder.into_inner().map_err(|e| e.into_error())
}

/// One complete CSV row, terminator included.
fn encode_row<R: Serialize>(record: &R) -> std::result::Result<Vec<u8>, AppendError> {
    let mut encoder = encoder();
    encoder.serialize(record)?;
    encoder.into_inner().map_err(|e| AppendError::Io(e.into_error()))
}
