//! Disk Store Module
//!
//! Durable tier: one JSON file per key under a cache root. Writes go through
//! a temp file and a rename so readers never observe a partial entry.
//! Read failures degrade to a miss; write and delete failures surface as
//! `false`. Corrupted files are deleted on sight.

use std::fmt::Write as FmtWrite;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs;
use tracing::{debug, warn};

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{CacheEntry, DiskStats};
use crate::error::Result;

const ENTRY_EXTENSION: &str = ".json";
const TEMP_EXTENSION: &str = ".tmp";
/// Common filesystem limit on a single path component, in bytes.
const NAME_MAX: usize = 255;
/// Bytes a temp name adds around the entry name: `.`, `.`, 8 + 16 hex digits, `.tmp`.
const TEMP_NAME_OVERHEAD: usize = 2 + 8 + 16 + TEMP_EXTENSION.len();
/// Longest entry file name written, so its temp name still fits in `NAME_MAX`.
const MAX_FILE_NAME: usize = NAME_MAX - TEMP_NAME_OVERHEAD;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

// == Disk Store ==
/// Filesystem-backed cache tier.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Creates a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // == Set ==
    /// Writes an entry atomically. Returns `false` on any failure.
    pub async fn set(&self, key: &str, entry: &CacheEntry) -> bool {
        let Some(file_name) = file_name_for(key) else {
            warn!(key, "Key too long to persist, skipping disk tier");
            return false;
        };

        let payload = match serde_json::to_vec(entry) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(key, error = %err, "Failed to serialize cache entry");
                return false;
            }
        };

        if let Err(err) = fs::create_dir_all(&self.root).await {
            warn!(dir = %self.root.display(), error = %err, "Failed to create cache directory");
            return false;
        }

        let target = self.root.join(&file_name);
        let temp = self.root.join(temp_name_for(&file_name));

        if let Err(err) = fs::write(&temp, &payload).await {
            warn!(path = %temp.display(), error = %err, "Failed to write cache file");
            let _ = fs::remove_file(&temp).await;
            return false;
        }

        if let Err(err) = fs::rename(&temp, &target).await {
            warn!(path = %target.display(), error = %err, "Failed to move cache file into place");
            let _ = fs::remove_file(&temp).await;
            return false;
        }

        true
    }

    // == Get ==
    /// Reads a live entry. Missing, unreadable, corrupted or expired files are
    /// all reported as a miss; corrupted and expired files are removed.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let path = self.root.join(file_name_for(key)?);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to read cache file");
                return None;
            }
        };

        let entry = match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Removing corrupted cache file");
                remove_file(&path).await;
                return None;
            }
        };

        if entry.is_expired() {
            debug!(key, "Disk entry expired");
            remove_file(&path).await;
            return None;
        }

        Some(entry)
    }

    // == Delete ==
    /// Removes the file for `key`. A missing file counts as success.
    pub async fn delete(&self, key: &str) -> bool {
        match file_name_for(key) {
            Some(file_name) => remove_file(&self.root.join(file_name)).await,
            None => true,
        }
    }

    // == Clear ==
    /// Removes every cache file, including stray temp files. Other files in
    /// the root are left alone.
    pub async fn clear(&self) -> bool {
        let names = match self.list(|name| is_entry_file(name) || is_temp_file(name)).await {
            Ok(names) => names,
            Err(err) => {
                warn!(dir = %self.root.display(), error = %err, "Failed to list cache directory");
                return false;
            }
        };

        let mut all_removed = true;
        for name in names {
            all_removed &= remove_file(&self.root.join(name)).await;
        }
        all_removed
    }

    // == Cleanup ==
    /// Deletes expired and unparseable entries, returning how many were removed.
    ///
    /// Fails only when the directory itself cannot be listed.
    pub async fn cleanup(&self) -> Result<usize> {
        let now = current_timestamp_ms();
        let mut removed = 0;

        for name in self.list(is_entry_file).await? {
            let path = self.root.join(&name);
            match read_entry(&path).await {
                FileState::Missing | FileState::Unreadable => {}
                FileState::Corrupted => {
                    warn!(path = %path.display(), "Removing corrupted cache file");
                    if remove_file(&path).await {
                        removed += 1;
                    }
                }
                FileState::Entry(entry, _) if entry.is_expired_at(now) => {
                    if remove_file(&path).await {
                        removed += 1;
                    }
                }
                FileState::Entry(..) => {}
            }
        }

        Ok(removed)
    }

    // == Remove Matching ==
    /// Removes every entry whose decoded key satisfies `predicate`.
    pub async fn remove_matching<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        let mut removed = 0;
        for key in self.keys().await {
            if predicate(key.as_str()) && self.delete(&key).await {
                removed += 1;
            }
        }
        removed
    }

    /// Keys of every entry file on disk, expired or not.
    pub async fn keys(&self) -> Vec<String> {
        match self.list(is_entry_file).await {
            Ok(names) => names.iter().filter_map(|name| key_for(name)).collect(),
            Err(err) => {
                warn!(dir = %self.root.display(), error = %err, "Failed to list cache directory");
                Vec::new()
            }
        }
    }

    // == Stats ==
    pub async fn stats(&self) -> DiskStats {
        let now = current_timestamp_ms();
        let mut stats = DiskStats::default();

        let names = match self.list(is_entry_file).await {
            Ok(names) => names,
            Err(err) => {
                warn!(dir = %self.root.display(), error = %err, "Failed to list cache directory");
                return stats;
            }
        };

        for name in names {
            match read_entry(&self.root.join(&name)).await {
                FileState::Missing | FileState::Unreadable => continue,
                FileState::Corrupted => stats.corrupted += 1,
                FileState::Entry(entry, size) => {
                    stats.bytes += size;
                    if entry.is_expired_at(now) {
                        stats.expired += 1;
                    }
                }
            }
            stats.files += 1;
        }

        stats
    }

    /// File names in the cache root accepted by `filter`. A missing root is empty.
    async fn list<F>(&self, filter: F) -> std::io::Result<Vec<String>>
    where
        F: Fn(&str) -> bool,
    {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let mut names = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            if let Some(name) = item.file_name().to_str() {
                if filter(name) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }
}

enum FileState {
    Missing,
    Unreadable,
    Corrupted,
    Entry(CacheEntry, u64),
}

async fn read_entry(path: &Path) -> FileState {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return FileState::Missing,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to read cache file");
            return FileState::Unreadable;
        }
    };

    match serde_json::from_slice::<CacheEntry>(&bytes) {
        Ok(entry) => FileState::Entry(entry, bytes.len() as u64),
        Err(_) => FileState::Corrupted,
    }
}

/// Removes a file, treating not-found as success.
async fn remove_file(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(err) if err.kind() == ErrorKind::NotFound => true,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to remove cache file");
            false
        }
    }
}

fn is_entry_file(name: &str) -> bool {
    name.ends_with(ENTRY_EXTENSION)
}

fn is_temp_file(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TEMP_EXTENSION)
}

// == Filename Encoding ==
/// Maps a key to its file name. Bytes outside `[A-Za-z0-9_.-]` become `%XX`.
fn file_name_for(key: &str) -> Option<String> {
    let mut name = String::with_capacity(key.len() + ENTRY_EXTENSION.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'.' | b'-') {
            name.push(byte as char);
        } else {
            let _ = write!(name, "%{byte:02X}");
        }
    }
    name.push_str(ENTRY_EXTENSION);

    (name.len() <= MAX_FILE_NAME).then_some(name)
}

/// Inverse of [`file_name_for`].
fn key_for(file_name: &str) -> Option<String> {
    let encoded = file_name.strip_suffix(ENTRY_EXTENSION)?.as_bytes();
    let mut bytes = Vec::with_capacity(encoded.len());
    let mut i = 0;

    while i < encoded.len() {
        if encoded[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            let hex = std::str::from_utf8(hex).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            bytes.push(encoded[i]);
            i += 1;
        }
    }

    String::from_utf8(bytes).ok()
}

fn temp_name_for(file_name: &str) -> String {
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(".{file_name}.{:08x}{seq:016x}{TEMP_EXTENSION}", std::process::id())
}
