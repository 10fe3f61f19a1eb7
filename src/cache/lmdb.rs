//! LMDB Store Module
//!
//! Memory-mapped key/value store backing the embedded cache, built on heed.
//!
//! One unnamed `Database<Str, Bytes>` holds every entry. A stored value is
//! `[expires_at: i64 LE unix millis, 0 = never][payload]`, so expiry can be
//! checked without touching the payload. Expired entries read as absent and
//! are purged by garbage collection, which also rewrites the data file with
//! a compacting copy when enough of it is free pages.
//!
//! # Thread Safety
//!
//! LMDB serializes writers itself. The environment handle sits behind an
//! `RwLock` that only compaction takes exclusively, while it swaps the data
//! file. Callers on an async runtime should invoke the store from
//! `spawn_blocking`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use heed::types::{Bytes, DecodeIgnore, Str};
use heed::{CompactionOption, Database, Env, EnvOpenOptions, RoTxn};
use tracing::{debug, info, warn};

use crate::cache::pattern::{glob_match, literal_prefix};
use crate::cache::CacheStats;
use crate::error::{CacheError, Result};

// == Constants ==
/// LMDB data file inside the store directory
pub const DATA_FILE: &str = "data.mdb";

/// Compacted copy written during garbage collection
const COMPACT_FILE: &str = "data.mdb.compact";

/// Default upper bound on the memory map (1 GiB)
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

const EXPIRY_LEN: usize = 8;

/// Stored expiry meaning "never"
const NO_EXPIRY: i64 = 0;

// == GC Outcome ==
/// Result of a garbage collection request.
#[derive(Debug, Clone, PartialEq)]
pub enum GcOutcome {
    /// Not enough free space to justify a rewrite
    NoRewrite { discard_ratio: f64 },
    /// Another pass is in progress
    AlreadyRunning,
    /// The data file was replaced by a compacted copy
    Compacted { reclaimed_bytes: u64, live_keys: usize },
}

struct Handle {
    env: Env,
    db: Database<Str, Bytes>,
}

// == LMDB Store ==
pub struct LmdbStore {
    dir: PathBuf,
    map_size: usize,
    /// `None` only while a failed compaction could not reopen the file
    handle: RwLock<Option<Handle>>,
    stats: Mutex<CacheStats>,
    gc_running: AtomicBool,
}

impl LmdbStore {
    // == Open ==
    /// Opens (or creates) the store in `dir` with the default map size.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_map_size(dir, DEFAULT_MAP_SIZE)
    }

    /// Opens the store, creating `dir` when missing.
    ///
    /// `map_size` caps how large the data file may grow, in bytes.
    pub fn open_with_map_size(dir: impl AsRef<Path>, map_size: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let scratch = dir.join(COMPACT_FILE);
        if scratch.exists() {
            warn!(path = %scratch.display(), "removing leftover compaction file");
            fs::remove_file(&scratch)?;
        }

        let handle = open_env(&dir, map_size)?;
        info!(path = %dir.display(), map_size, "lmdb store opened");

        Ok(Self {
            dir,
            map_size,
            handle: RwLock::new(Some(handle)),
            stats: Mutex::new(CacheStats::new()),
            gc_running: AtomicBool::new(false),
        })
    }

    /// Directory holding the LMDB files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn with_handle<T>(&self, op: impl FnOnce(&Handle) -> Result<T>) -> Result<T> {
        let guard = self
            .handle
            .read()
            .map_err(|_| CacheError::Internal("lmdb handle lock poisoned".to_string()))?;
        match guard.as_ref() {
            Some(handle) => op(handle),
            None => Err(closed()),
        }
    }

    fn record_read(&self, found: bool) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.record_read(found);
        }
    }

    // == Set ==
    /// Stores `value` under `key`. `ttl == None` means the entry never expires.
    pub fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let entry = encode_entry(&value, expires_at(ttl));
        self.with_handle(|h| {
            let mut wtxn = h.env.write_txn()?;
            h.db.put(&mut wtxn, key, &entry)?;
            wtxn.commit()?;
            Ok(())
        })
    }

    // == Get ==
    /// Returns the stored bytes, or `None` when the key is absent or expired.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self.with_handle(|h| {
            let rtxn = h.env.read_txn()?;
            match h.db.get(&rtxn, key)? {
                Some(bytes) => {
                    let (expires_at, payload) = decode_entry(bytes)?;
                    Ok(is_live(expires_at, now_ms()).then(|| payload.to_vec()))
                }
                None => Ok(None),
            }
        })?;

        self.record_read(value.is_some());
        Ok(value)
    }

    // == Has ==
    /// Reads the expiry prefix only.
    pub fn has(&self, key: &str) -> Result<bool> {
        self.with_handle(|h| {
            let rtxn = h.env.read_txn()?;
            match h.db.get(&rtxn, key)? {
                Some(bytes) => Ok(is_live(decode_entry(bytes)?.0, now_ms())),
                None => Ok(false),
            }
        })
    }

    // == Delete ==
    /// Removes `key`. Returns whether it was present.
    pub fn delete(&self, key: &str) -> Result<bool> {
        self.with_handle(|h| {
            let mut wtxn = h.env.write_txn()?;
            let existed = h.db.delete(&mut wtxn, key)?;
            wtxn.commit()?;
            Ok(existed)
        })
    }

    // == Delete Matching ==
    /// Removes every key matching the glob `pattern` in one transaction.
    ///
    /// Only keys are scanned, starting at the pattern's literal prefix.
    pub fn delete_matching(&self, pattern: &str) -> Result<usize> {
        let removed = self.with_handle(|h| {
            let mut wtxn = h.env.write_txn()?;
            let keys = matching_keys(h, &wtxn, pattern)?;
            for key in &keys {
                h.db.delete(&mut wtxn, key)?;
            }
            wtxn.commit()?;
            Ok(keys.len())
        })?;

        debug!(pattern, removed, "lmdb keys removed by pattern");
        Ok(removed)
    }

    // == Clear ==
    /// Removes every key.
    pub fn clear(&self) -> Result<usize> {
        self.with_handle(|h| {
            let mut wtxn = h.env.write_txn()?;
            let count = h.db.len(&wtxn)?;
            h.db.clear(&mut wtxn)?;
            wtxn.commit()?;
            Ok(count as usize)
        })
    }

    /// Live (unexpired) keys.
    pub fn keys(&self) -> Result<Vec<String>> {
        self.with_handle(|h| {
            let rtxn = h.env.read_txn()?;
            let now = now_ms();
            let mut keys = Vec::new();
            for entry in h.db.iter(&rtxn)? {
                let (key, bytes) = entry?;
                if is_live(decode_entry(bytes)?.0, now) {
                    keys.push(key.to_string());
                }
            }
            Ok(keys)
        })
    }

    // == Stats ==
    /// Counters plus the data file footprint. Free pages count as stale.
    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = self
            .stats
            .lock()
            .map_err(|_| CacheError::Internal("lmdb stats lock poisoned".to_string()))?
            .clone();

        self.with_handle(|h| {
            let (total, used) = footprint(&h.env)?;
            stats.live_keys = count_live(h)?;
            stats.total_bytes = total;
            stats.stale_bytes = total.saturating_sub(used);
            Ok(())
        })?;
        Ok(stats)
    }

    /// Flushes the memory map to disk.
    pub fn sync(&self) -> Result<()> {
        self.with_handle(|h| Ok(h.env.force_sync()?))
    }

    // == Garbage Collection ==
    /// Purges expired entries, then replaces the data file with a compacting
    /// copy when at least `discard_ratio` of it is free pages.
    ///
    /// Foreground calls wait only while the compacted file is written and
    /// swapped in. Only one pass runs at a time.
    pub fn run_gc(&self, discard_ratio: f64) -> Result<GcOutcome> {
        if self
            .gc_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(GcOutcome::AlreadyRunning);
        }
        let _guard = GcGuard(&self.gc_running);

        let purged = self.purge_expired()?;
        let (total, used) = self.with_handle(|h| footprint(&h.env))?;
        let ratio = if total == 0 {
            0.0
        } else {
            total.saturating_sub(used) as f64 / total as f64
        };

        if total == 0 || ratio < discard_ratio {
            debug!(purged, ratio, threshold = discard_ratio, "lmdb compaction skipped");
            return Ok(GcOutcome::NoRewrite {
                discard_ratio: ratio,
            });
        }

        match self.compact(total) {
            Ok(outcome) => {
                info!(purged, ?outcome, "lmdb store compacted");
                Ok(outcome)
            }
            Err(err) => {
                let _ = fs::remove_file(self.dir.join(COMPACT_FILE));
                Err(CacheError::StorageCompaction(err.to_string()))
            }
        }
    }

    fn purge_expired(&self) -> Result<usize> {
        self.with_handle(|h| {
            let now = now_ms();
            let mut wtxn = h.env.write_txn()?;
            let mut expired = Vec::new();
            for entry in h.db.iter(&wtxn)? {
                let (key, bytes) = entry?;
                if !is_live(decode_entry(bytes)?.0, now) {
                    expired.push(key.to_string());
                }
            }
            for key in &expired {
                h.db.delete(&mut wtxn, key)?;
            }
            wtxn.commit()?;
            Ok(expired.len())
        })
    }

    /// Writes a compacted copy, closes the environment, swaps the data file
    /// and reopens. Holds the handle exclusively throughout.
    fn compact(&self, before: u64) -> Result<GcOutcome> {
        let mut slot = self
            .handle
            .write()
            .map_err(|_| CacheError::Internal("lmdb handle lock poisoned".to_string()))?;
        let handle = slot.take().ok_or_else(closed)?;

        let scratch = self.dir.join(COMPACT_FILE);
        let copied = handle
            .env
            .copy_to_file(&scratch, CompactionOption::Enabled)
            .map_err(CacheError::from)
            .and_then(|file| Ok(file.sync_all()?));
        if let Err(err) = copied {
            *slot = Some(handle);
            return Err(err);
        }

        handle.env.prepare_for_closing().wait();
        let swapped = fs::rename(&scratch, self.dir.join(DATA_FILE));
        let reopened = open_env(&self.dir, self.map_size)?;
        let after = footprint(&reopened.env)?.0;
        let live_keys = count_live(&reopened)?;
        *slot = Some(reopened);
        swapped?;

        if let Ok(mut stats) = self.stats.lock() {
            stats.record_gc();
        }
        Ok(GcOutcome::Compacted {
            reclaimed_bytes: before.saturating_sub(after),
            live_keys,
        })
    }
}

struct GcGuard<'a>(&'a AtomicBool);

impl Drop for GcGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// == Helpers ==
fn open_env(dir: &Path, map_size: usize) -> Result<Handle> {
    // SAFETY: the directory is owned by this store and the data file is only
    // replaced while the environment is closed.
    let env = unsafe { EnvOpenOptions::new().map_size(map_size).max_dbs(1).open(dir) }?;

    let mut wtxn = env.write_txn()?;
    let db: Database<Str, Bytes> = env.create_database(&mut wtxn, None)?;
    wtxn.commit()?;

    Ok(Handle { env, db })
}

fn closed() -> CacheError {
    CacheError::BackendUnavailable("embedded store is closed".to_string())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Absolute expiry for `ttl`, saturating for lifetimes beyond the clock range.
fn expires_at(ttl: Option<Duration>) -> i64 {
    match ttl {
        Some(ttl) => {
            let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            now_ms().saturating_add(millis).max(NO_EXPIRY + 1)
        }
        None => NO_EXPIRY,
    }
}

fn is_live(expires_at: i64, now_ms: i64) -> bool {
    expires_at == NO_EXPIRY || now_ms < expires_at
}

fn encode_entry(payload: &[u8], expires_at: i64) -> Vec<u8> {
    let mut entry = Vec::with_capacity(EXPIRY_LEN + payload.len());
    entry.extend_from_slice(&expires_at.to_le_bytes());
    entry.extend_from_slice(payload);
    entry
}

fn decode_entry(bytes: &[u8]) -> Result<(i64, &[u8])> {
    if bytes.len() < EXPIRY_LEN {
        return Err(CacheError::Serialization(format!(
            "stored entry is {} bytes, shorter than its expiry header",
            bytes.len()
        )));
    }
    let (header, payload) = bytes.split_at(EXPIRY_LEN);
    let mut expiry = [0u8; EXPIRY_LEN];
    expiry.copy_from_slice(header);
    Ok((i64::from_le_bytes(expiry), payload))
}

/// Keys matching `pattern`, scanned without decoding values.
fn matching_keys(h: &Handle, txn: &RoTxn, pattern: &str) -> Result<Vec<String>> {
    let keys_only = h.db.remap_data_type::<DecodeIgnore>();
    let mut keys = Vec::new();
    for entry in keys_only.prefix_iter(txn, literal_prefix(pattern))? {
        let (key, ()) = entry?;
        if glob_match(pattern, key) {
            keys.push(key.to_string());
        }
    }
    Ok(keys)
}

fn count_live(h: &Handle) -> Result<usize> {
    let rtxn = h.env.read_txn()?;
    let now = now_ms();
    let mut live = 0;
    for entry in h.db.iter(&rtxn)? {
        let (_, bytes) = entry?;
        if is_live(decode_entry(bytes)?.0, now) {
            live += 1;
        }
    }
    Ok(live)
}

/// Data file size and the part of it held by pages in use.
fn footprint(env: &Env) -> Result<(u64, u64)> {
    Ok((env.real_disk_size()?, env.non_free_pages_size()?))
}
