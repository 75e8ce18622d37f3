//! The `Store`: coordinates the index, the active log file, and the
//! directory layout, and implements Open/Put/Get/Delete/Merge/Close.
//!
//! Concurrency model (spec §5): a single `RwLock` guards the index and
//! the log file handle together. Put, Delete, and the installation phase
//! of Merge take the write guard; Get takes the read guard, so many Gets
//! run concurrently. This is a deliberate departure from the teacher
//! engine's split reader-cache/`Mutex`-writer/`DashMap`-index design,
//! which exists there to serve a generational multi-file log behind a
//! TCP server — this store has one active file and no network layer, so
//! one lock suffices and is what the design explicitly asks for.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Instant;

use log::{info, warn};

use crate::error::{KvsError, Result};
use crate::log_file::{LogFile, ReadOutcome};
use crate::record::{Mark, Record};

/// The active append-only log, relative to the store directory.
const LOG_FILE_NAME: &str = "minibitcask.data";
/// The ephemeral merge output, present only mid-merge.
const MERGE_FILE_NAME: &str = "minibitcask.data.merge";

/// Documented extensions to the reference's zero-configuration behavior
/// (spec §6: "a reimplementation may add a sync-on-write toggle ... but
/// must default to the reference behavior"). `Store::open` always uses
/// `StoreOptions::default()`.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// When `true`, every appended record (`Put`, `Del`, and each record
    /// copied during `Merge`) is flushed to stable storage with
    /// `File::sync_data` before the call returns. Defaults to `false`,
    /// matching the reference, which never fsyncs.
    pub sync_on_write: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            sync_on_write: false,
        }
    }
}

struct StoreState {
    dir_path: PathBuf,
    /// `None` after `close()`; every operation checks this and fails with
    /// `InvalidLogFile` rather than exhibiting the reference's "undefined
    /// behavior after Close".
    log: Option<LogFile>,
    index: HashMap<Vec<u8>, u64>,
}

/// An embeddable, single-writer Bitcask-style key/value store.
///
/// One `Store` exclusively owns one directory; there is no cross-process
/// exclusion (spec §3: "the design does not enforce cross-process
/// exclusion").
pub struct Store {
    state: RwLock<StoreState>,
    options: StoreOptions,
}

impl Store {
    /// Opens (creating if absent) the store at `dir`, replaying its log
    /// to rebuild the in-memory index.
    pub fn open(dir: impl AsRef<Path>) -> Result<Store> {
        Store::open_with_options(dir, StoreOptions::default())
    }

    /// Like [`Store::open`], with the documented extension options from
    /// [`StoreOptions`].
    pub fn open_with_options(dir: impl AsRef<Path>, options: StoreOptions) -> Result<Store> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let dir_path = fs::canonicalize(dir)?;

        let log_path = dir_path.join(LOG_FILE_NAME);
        let mut log = LogFile::open(&log_path)?;
        let index = rebuild_index(&mut log, &dir_path)?;

        info!(
            "opened minibitcask store at {:?} ({} live keys)",
            dir_path,
            index.len()
        );

        Ok(Store {
            state: RwLock::new(StoreState {
                dir_path,
                log: Some(log),
                index,
            }),
            options,
        })
    }

    /// Sets `key` to `value`. A no-op (silent success) if `key` is empty.
    pub fn put(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Ok(());
        }
        let value = value.into();

        let mut state = self.state.write().unwrap();
        let log = state.log.as_mut().ok_or(KvsError::InvalidLogFile)?;

        // The offset snapshotted by `append` is taken *before* the write,
        // which is the only correct choice (spec §5): the index must
        // point at the start of the new record, never at the post-write
        // tail.
        let record = Record::put(key.clone(), value);
        let write_off = log.append(&record)?;
        if self.options.sync_on_write {
            log.sync()?;
        }

        state.index.insert(key, write_off);
        Ok(())
    }

    /// Returns the value of `key`, or an empty value if `key` is unknown
    /// or empty.
    ///
    /// This swallows a missing key into `Ok(Vec::new())` rather than
    /// returning `KvsError::KeyNotFound`, preserving the reference's quirk
    /// (spec §7/§9 item 4). Use [`Store::get_opt`] to distinguish "absent"
    /// from "present with an empty value".
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        Ok(self.get_opt(key)?.unwrap_or_default())
    }

    /// Like [`Store::get`], but returns `Ok(None)` for an absent key
    /// instead of swallowing it into an empty value.
    pub fn get_opt(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        let key = key.as_ref();
        if key.is_empty() {
            return Ok(None);
        }

        let state = self.state.read().unwrap();
        let log = state.log.as_ref().ok_or(KvsError::InvalidLogFile)?;

        let offset = match lookup_offset(&state, key) {
            Ok(offset) => offset,
            Err(KvsError::KeyNotFound) => return Ok(None),
            Err(e) => return Err(e),
        };

        match log.read_at(offset)? {
            ReadOutcome::Record(record) => Ok(Some(record.value)),
            ReadOutcome::EndOfLog | ReadOutcome::TornRecord => Err(KvsError::DecodeError(
                format!("index pointed key at offset {offset}, but no record was found there"),
            )),
        }
    }

    /// Returns whether `key` currently has a live entry in the index.
    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        let key = key.as_ref();
        if key.is_empty() {
            return Ok(false);
        }
        let state = self.state.read().unwrap();
        if state.log.is_none() {
            return Err(KvsError::InvalidLogFile);
        }
        Ok(state.index.contains_key(key))
    }

    /// Removes `key`. A no-op if `key` is empty or already absent.
    pub fn delete(&self, key: impl Into<Vec<u8>>) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().unwrap();
        if !state.index.contains_key(&key) {
            return Ok(());
        }

        let log = state.log.as_mut().ok_or(KvsError::InvalidLogFile)?;
        let record = Record::del(key.clone());
        log.append(&record)?;
        if self.options.sync_on_write {
            log.sync()?;
        }

        state.index.remove(&key);
        Ok(())
    }

    /// Rewrites the log to contain only live records, reached from the
    /// index at merge start, each exactly once; installs the rewritten
    /// log as the new active log.
    ///
    /// Fixes three bugs the reference implementation has (spec §9 items
    /// 1-3): the scan advances by each record's encoded size instead of
    /// looping on the same offset; the writer lock is held for the whole
    /// merge rather than left unlocked during the scan; and the merge
    /// output is renamed into place rather than scheduled for deletion.
    pub fn merge(&self) -> Result<()> {
        let mut state = self.state.write().unwrap();

        {
            let log = state.log.as_ref().ok_or(KvsError::InvalidLogFile)?;
            if log.len() == 0 {
                return Ok(());
            }
        }

        let dir_path = state.dir_path.clone();
        info!("merge starting for {:?}", dir_path);
        let started = Instant::now();

        let retained = scan_retained(&state)?;

        let merge_path = dir_path.join(MERGE_FILE_NAME);
        let new_index = match write_merge_file(&merge_path, &retained, self.options.sync_on_write)
        {
            Ok(new_index) => new_index,
            Err(e) => {
                let _ = fs::remove_file(&merge_path);
                return Err(e);
            }
        };

        let log_path = dir_path.join(LOG_FILE_NAME);
        // Close our handle on the old log before replacing the file
        // (required on Windows; a no-op on Unix, where the data stays
        // reachable through the handle until it is dropped).
        drop(state.log.take());

        if let Err(e) = fs::rename(&merge_path, &log_path) {
            // The old log's bytes were never touched, so reopening it
            // leaves the store intact (spec §7: "either the new log is
            // installed and the index reflects it, or the old log
            // remains intact"). The half-written merge file must go too,
            // or the next merge would reopen it and append after its
            // stale content instead of starting fresh.
            let _ = fs::remove_file(&merge_path);
            state.log = Some(LogFile::open(&log_path)?);
            return Err(e.into());
        }

        state.log = Some(LogFile::open(&log_path)?);
        let retained_count = new_index.len();
        state.index = new_index;

        info!(
            "merge finished for {:?}: {} live records retained in {:?}",
            dir_path,
            retained_count,
            started.elapsed()
        );
        Ok(())
    }

    /// Releases the log file handle. Further operations on the `Store`
    /// return `KvsError::InvalidLogFile` rather than the reference's
    /// undefined behavior.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write().unwrap();
        match state.log.take() {
            Some(_) => Ok(()),
            None => Err(KvsError::InvalidLogFile),
        }
    }
}

/// Looks up `key`'s current offset, as a proper `KeyNotFound` rather than
/// an `Option` — this is the error spec §7 names as the reason a missing
/// key fails internally, even though `Store::get` goes on to swallow it.
fn lookup_offset(state: &StoreState, key: &[u8]) -> Result<u64> {
    state
        .index
        .get(key)
        .copied()
        .ok_or(KvsError::KeyNotFound)
}

/// Sequentially replays the log from offset 0, rebuilding the index.
///
/// Stops cleanly on `EndOfLog`. A torn tail record (spec §9: a documented
/// improvement over the reference, which "stops silently on any other
/// read error") truncates the log to the last complete record instead of
/// silently dropping the rest of the scan; any other read error is
/// propagated rather than swallowed.
fn rebuild_index(log: &mut LogFile, dir_path: &Path) -> Result<HashMap<Vec<u8>, u64>> {
    let mut index = HashMap::new();
    let mut offset = 0u64;

    loop {
        match log.read_at(offset)? {
            ReadOutcome::EndOfLog => break,
            ReadOutcome::TornRecord => {
                warn!(
                    "torn record at offset {offset} in {:?}; truncating to last complete record",
                    dir_path
                );
                log.truncate_to(offset)?;
                break;
            }
            ReadOutcome::Record(record) => {
                let size = record.encoded_len();
                match record.mark {
                    Mark::Put => {
                        index.insert(record.key, offset);
                    }
                    Mark::Del => {
                        index.remove(&record.key);
                    }
                }
                offset += size;
            }
        }
    }

    Ok(index)
}

/// Scans the current log, keeping each record whose index entry still
/// points at its offset (everything else is either superseded or
/// tombstoned garbage). Holds no additional lock beyond the write guard
/// `merge` already took.
fn scan_retained(state: &StoreState) -> Result<Vec<Record>> {
    let log = state.log.as_ref().ok_or(KvsError::InvalidLogFile)?;
    let mut retained = Vec::new();
    let mut offset = 0u64;

    loop {
        match log.read_at(offset)? {
            ReadOutcome::EndOfLog => break,
            ReadOutcome::TornRecord => {
                warn!(
                    "torn record encountered mid-merge at offset {offset} in {:?}; stopping scan early",
                    state.dir_path
                );
                break;
            }
            ReadOutcome::Record(record) => {
                let size = record.encoded_len();
                if matches!(record.mark, Mark::Put)
                    && state.index.get(&record.key) == Some(&offset)
                {
                    retained.push(record);
                }
                offset += size;
            }
        }
    }

    Ok(retained)
}

/// Writes `retained` to a fresh side file at `merge_path`, returning the
/// offsets each key now lives at in that file. The caller is responsible
/// for removing `merge_path` if this returns an error.
fn write_merge_file(
    merge_path: &Path,
    retained: &[Record],
    sync_on_write: bool,
) -> Result<HashMap<Vec<u8>, u64>> {
    let mut merge_log = LogFile::open(merge_path)?;
    let mut new_index = HashMap::with_capacity(retained.len());

    for record in retained {
        let write_off = merge_log.append(record)?;
        new_index.insert(record.key.clone(), write_off);
    }
    if sync_on_write {
        merge_log.sync()?;
    }

    Ok(new_index)
}
