//! Ephemeral download registry
//!
//! Maps a generated id to a finished file for a bounded time. Once an entry
//! expires it is gone from the map and its file is deleted, whether that is
//! noticed by a lookup or by the sweep. `take` hands a file out exactly once.
//!
//! The map lives in memory, so files published by an earlier process are
//! unknown here; `purge_orphans` reclaims them from the scratch directory.

use crate::extractor::models::MediaFormat;
use crate::store::{EntryStore, MemoryStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// A finished artifact ready to hand to a caller
#[derive(Debug, Clone, Serialize)]
pub struct PublishedFile {
    pub path: PathBuf,
    /// Name suggested to the caller when it saves the file
    pub filename: String,
    pub metadata: serde_json::Value,
    pub format: MediaFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryEntry {
    pub file: PublishedFile,
    pub expires_at: DateTime<Utc>,
}

impl RegistryEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Registry lookup plus what a caller needs to serve it
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub entry: RegistryEntry,
    pub content_type: &'static str,
}

/// MIME type from the file extension
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mov") => "video/quicktime",
        Some("flv") => "video/x-flv",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("aac") => "audio/aac",
        Some("opus") => "audio/opus",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        _ => "application/octet-stream",
    }
}

fn expiry_after(ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(52));
    Utc::now() + ttl
}

/// Delete a backing file; failures are logged and otherwise ignored
pub(crate) async fn delete_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Deleted {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
    }
}

pub struct DownloadRegistry {
    store: Arc<dyn EntryStore<RegistryEntry>>,
    default_ttl: Duration,
}

impl DownloadRegistry {
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), default_ttl)
    }

    pub fn with_store(store: Arc<dyn EntryStore<RegistryEntry>>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Register `file` under `id` for `ttl`
    ///
    /// Replacing an id whose previous file differs deletes the old file.
    pub async fn put(&self, id: &str, file: PublishedFile, ttl: Duration) -> RegistryEntry {
        let entry = RegistryEntry {
            file,
            expires_at: expiry_after(ttl),
        };

        if let Some(previous) = self.store.put(id, entry.clone()).await {
            if previous.file.path != entry.file.path {
                delete_quietly(&previous.file.path).await;
            }
        }

        debug!(id = %id, "Registered {} until {}", entry.file.path.display(), entry.expires_at);
        entry
    }

    pub async fn put_default(&self, id: &str, file: PublishedFile) -> RegistryEntry {
        self.put(id, file, self.default_ttl).await
    }

    /// Look up a live entry without consuming it; an expired one is removed
    /// along with its file
    pub async fn get(&self, id: &str) -> Option<RegistryEntry> {
        let entry = self.store.get(id).await?;
        let now = Utc::now();

        if entry.is_expired(now) {
            debug!(id = %id, "Registry entry expired on lookup");
            // Only the expired entry goes; a replacement stored meanwhile stays
            if let Some(removed) = self
                .store
                .remove_if(id, &move |e: &RegistryEntry| e.is_expired(now))
                .await
            {
                delete_quietly(&removed.file.path).await;
            }
            return None;
        }

        Some(entry)
    }

    /// Consume the entry for `id`
    ///
    /// The entry leaves the map atomically, so concurrent callers cannot both
    /// receive it. The file stays on disk and becomes the caller's to serve
    /// and remove; an expired entry yields `None` and its file is deleted.
    pub async fn take(&self, id: &str) -> Option<Retrieval> {
        let entry = self.store.remove(id).await?;

        if entry.is_expired(Utc::now()) {
            debug!(id = %id, "Registry entry expired before retrieval");
            delete_quietly(&entry.file.path).await;
            return None;
        }

        let content_type = content_type_for(&entry.file.path);
        debug!(id = %id, "Handed out {}", entry.file.path.display());
        Some(Retrieval {
            entry,
            content_type,
        })
    }

    /// Drop an entry early and delete its file; returns whether it existed
    pub async fn release(&self, id: &str) -> bool {
        match self.store.remove(id).await {
            Some(entry) => {
                delete_quietly(&entry.file.path).await;
                true
            }
            None => false,
        }
    }

    /// Remove expired entries and their files; returns how many were dropped
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let removed = self
            .store
            .sweep(&move |e: &RegistryEntry| e.is_expired(now))
            .await;

        for (_, entry) in &removed {
            delete_quietly(&entry.file.path).await;
        }
        if !removed.is_empty() {
            info!("Registry sweep removed {} expired download(s)", removed.len());
        }
        removed.len()
    }

    /// Delete files in `dir` older than `max_age` that no live entry owns
    ///
    /// Covers files left behind by a previous process or handed out by
    /// `take` and never removed. Returns how many files were deleted.
    pub async fn purge_orphans(&self, dir: &Path, max_age: Duration) -> usize {
        let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
            return 0;
        };
        let owned: HashSet<PathBuf> = self
            .store
            .entries()
            .await
            .into_iter()
            .map(|(_, e)| e.file.path)
            .collect();
        let now = SystemTime::now();
        let mut purged = 0;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if owned.contains(&path) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age >= max_age {
                delete_quietly(&path).await;
                purged += 1;
            }
        }

        if purged > 0 {
            info!("Purged {} orphaned file(s) from {}", purged, dir.display());
        }
        purged
    }

    pub async fn len(&self) -> usize {
        self.store.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.store.is_empty().await
    }
}
