//! The append-only log file: a thin wrapper around a single [`File`] that
//! tracks the write cursor and serves positional reads, in the style of
//! the teacher crate's `BufReaderWithPos`/`BufWriterWithPos` wrappers
//! (`engines/bitcask.rs`), but positional rather than buffered-sequential
//! since the `Store` jumps to arbitrary offsets for `Get` and `Merge`.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Mutex;

use log::warn;

use crate::error::Result;
use crate::record::{self, Mark, Record, HEADER_SIZE};

#[cfg(feature = "checksum")]
use crate::error::KvsError;
#[cfg(feature = "checksum")]
use crate::record::{checksum_of, CHECKSUM_SIZE};

/// Outcome of a positional read, distinguishing the normal end-of-log
/// condition from an actual record (spec §4.2: `EndOfLog` is a scan
/// terminator, never user-visible).
pub(crate) enum ReadOutcome {
    /// A fully-formed record was read.
    Record(Record),
    /// `offset` is at or past the file's current length: there is nothing
    /// more to scan.
    EndOfLog,
    /// A record starts at `offset` but fewer bytes are available than its
    /// header or its promised key/value bytes: a torn write, almost
    /// always the last record in the file after a crash mid-append.
    TornRecord,
}

/// A small, thread-safe pool of reusable 10-byte header buffers.
///
/// Ten bytes is cheap enough that a stack buffer would do just as well
/// (spec §9: "may be replaced by a per-read stack buffer at negligible
/// cost"), but the reference design calls for a pool, and `Get` may run
/// from many threads at once, so this mirrors that shape with a plain
/// `Mutex`-guarded free list rather than pulling in a pooling crate for
/// ten bytes.
struct HeaderBufferPool {
    free: Mutex<Vec<Box<[u8; HEADER_SIZE as usize]>>>,
}

impl HeaderBufferPool {
    fn new() -> Self {
        HeaderBufferPool {
            free: Mutex::new(Vec::new()),
        }
    }

    fn acquire(&self) -> Box<[u8; HEADER_SIZE as usize]> {
        self.free
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Box::new([0u8; HEADER_SIZE as usize]))
    }

    fn release(&self, buf: Box<[u8; HEADER_SIZE as usize]>) {
        self.free.lock().unwrap().push(buf);
    }
}

/// A single append-only log file plus its write cursor.
///
/// Not internally synchronized: the `Store` serializes access via its own
/// lock (spec §4.2: "the handle is not internally synchronized; the Store
/// provides exclusion").
pub(crate) struct LogFile {
    file: File,
    offset: u64,
    header_pool: HeaderBufferPool,
}

impl LogFile {
    /// Opens (creating if absent, mode 0644) the file at `path` and sets
    /// the write cursor to its current length.
    pub(crate) fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let offset = file.metadata()?.len();
        Ok(LogFile {
            file,
            offset,
            header_pool: HeaderBufferPool::new(),
        })
    }

    /// The log's current tail offset, equal to its byte length.
    pub(crate) fn len(&self) -> u64 {
        self.offset
    }

    /// Appends `record` at the current tail and advances the cursor.
    /// Returns the offset the record was written at.
    pub(crate) fn append(&mut self, record: &Record) -> Result<u64> {
        let write_off = self.offset;
        let bytes = record.encode()?;
        self.file.write_all_at(&bytes, write_off)?;
        self.offset += bytes.len() as u64;
        Ok(write_off)
    }

    /// Flushes this record's data to stable storage. Only meaningful when
    /// the store is configured with `sync_on_write = true`; the reference
    /// behavior never calls this (spec §6: "No tunable options in the
    /// reference").
    pub(crate) fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Reads the record at `offset`, without moving the write cursor.
    pub(crate) fn read_at(&self, offset: u64) -> Result<ReadOutcome> {
        if offset >= self.offset {
            return Ok(ReadOutcome::EndOfLog);
        }

        let mut header_buf = self.header_pool.acquire();
        match self.file.read_exact_at(&mut header_buf[..], offset) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.header_pool.release(header_buf);
                return Ok(ReadOutcome::TornRecord);
            }
            Err(e) => {
                self.header_pool.release(header_buf);
                return Err(e.into());
            }
        }
        let (key_size, value_size, mark) = record::decode_header(&header_buf);
        self.header_pool.release(header_buf);

        let mark = match Mark::try_from(mark) {
            Ok(mark) => mark,
            Err(e) => {
                warn!("record at offset {offset} has an unrecognized mark: {e}");
                return Err(e);
            }
        };

        let mut body_off = offset + HEADER_SIZE;
        let mut key = vec![0u8; key_size as usize];
        if key_size > 0 {
            if let Err(e) = self.file.read_exact_at(&mut key, body_off) {
                return torn_or_err(e);
            }
        }
        body_off += key_size as u64;

        let mut value = vec![0u8; value_size as usize];
        if value_size > 0 {
            if let Err(e) = self.file.read_exact_at(&mut value, body_off) {
                return torn_or_err(e);
            }
        }

        #[cfg(feature = "checksum")]
        {
            body_off += value_size as u64;
            let mut checksum_buf = [0u8; CHECKSUM_SIZE as usize];
            if let Err(e) = self.file.read_exact_at(&mut checksum_buf, body_off) {
                return torn_or_err(e);
            }
            let want = u32::from_be_bytes(checksum_buf);
            let got = checksum_of(&key, &value);
            if want != got {
                return Err(KvsError::DecodeError(format!(
                    "checksum mismatch at offset {offset}: expected {want}, computed {got}"
                )));
            }
        }

        Ok(ReadOutcome::Record(Record { key, value, mark }))
    }

    /// Truncates the file (and the write cursor) to `len`, discarding a
    /// torn tail record found during index rebuild (spec §9: "recoverable
    /// partial reads ... should truncate the log to the last complete
    /// record rather than silently stopping").
    pub(crate) fn truncate_to(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        self.offset = len;
        Ok(())
    }
}

fn torn_or_err(e: io::Error) -> Result<ReadOutcome> {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Ok(ReadOutcome::TornRecord)
    } else {
        Err(e.into())
    }
}
