//! Partitions persisted under a cache directory.
//!
//! Layout: one directory per partition, and per entry a JSON metadata file
//! named by the SHA-256 of the entry key plus a raw body file. The metadata
//! file is replaced with a rename, so readers see either the old or the new
//! entry and never a partial one. Writers are serialized per storage so an
//! overwrite always removes the body file it replaced.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{CacheEntry, CacheStorage};
use crate::error::CacheError;
use crate::http::{CachedResponse, Headers, Request};

const META_EXT: &str = "json";
const BODY_EXT: &str = "body";

/// Suffix counter so concurrent writers never share a temp or body file name
static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

fn next_file_id() -> u64 {
    NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryFile {
    key: String,
    request: Request,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(default)]
    headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body_file: Option<String>,
    stored_at: DateTime<Utc>,
    #[serde(default)]
    attempts: u32,
}

pub struct DiskStorage {
    root: PathBuf,
    /// Held by `put` and `delete`; reads never take it
    writes: Mutex<()>,
}

impl DiskStorage {
    pub fn new(root: PathBuf) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&root).map_err(CacheError::io(&root))?;
        Ok(Self {
            root,
            writes: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, partition: &str) -> Result<PathBuf, CacheError> {
        let valid = !partition.is_empty()
            && !partition.starts_with('.')
            && !partition.contains(&['/', '\\'][..]);
        if !valid {
            return Err(CacheError::InvalidPartitionName(partition.to_string()));
        }
        Ok(self.root.join(partition))
    }

    async fn existing_dir(&self, partition: &str) -> Result<PathBuf, CacheError> {
        let dir = self.partition_dir(partition)?;
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(CacheError::PartitionMissing(partition.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(CacheError::PartitionMissing(partition.to_string()))
            }
            Err(e) => Err(CacheError::Io { path: dir, source: e }),
        }
    }

    fn entry_stem(key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    fn meta_path(dir: &Path, key: &str) -> PathBuf {
        dir.join(format!("{}.{}", Self::entry_stem(key), META_EXT))
    }

    async fn read_meta(path: &Path) -> Result<Option<EntryFile>, CacheError> {
        let contents = match fs::read(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Io { path: path.to_path_buf(), source: e }),
        };
        Ok(Some(serde_json::from_slice(&contents)?))
    }

    async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
        let tmp = path.with_extension(format!("tmp{}", next_file_id()));
        fs::write(&tmp, contents).await.map_err(CacheError::io(&tmp))?;
        fs::rename(&tmp, path).await.map_err(CacheError::io(path))
    }

    async fn remove_body(dir: &Path, body_file: &str) {
        let path = dir.join(body_file);
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "Failed to remove body file");
            }
        }
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn names(&self) -> Result<Vec<String>, CacheError> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(CacheError::io(&self.root))?;
        while let Some(entry) = dir.next_entry().await.map_err(CacheError::io(&self.root))? {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if is_dir {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn create(&self, partition: &str) -> Result<(), CacheError> {
        let dir = self.partition_dir(partition)?;
        fs::create_dir_all(&dir).await.map_err(CacheError::io(&dir))
    }

    async fn remove(&self, partition: &str) -> Result<bool, CacheError> {
        let dir = self.partition_dir(partition)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Io { path: dir, source: e }),
        }
    }

    async fn get(&self, partition: &str, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let dir = self.existing_dir(partition).await?;
        let meta = match Self::read_meta(&Self::meta_path(&dir, key)).await? {
            Some(meta) => meta,
            None => return Ok(None),
        };

        let response = match (meta.status, meta.body_file) {
            (Some(status), Some(body_file)) => {
                let path = dir.join(&body_file);
                let body = match fs::read(&path).await {
                    Ok(body) => body,
                    // Replaced by a concurrent writer between the two reads
                    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                    Err(e) => return Err(CacheError::Io { path, source: e }),
                };
                Some(CachedResponse {
                    status,
                    headers: meta.headers,
                    body,
                })
            }
            _ => None,
        };

        Ok(Some(CacheEntry {
            request: meta.request,
            response,
            stored_at: meta.stored_at,
            attempts: meta.attempts,
        }))
    }

    async fn put(&self, partition: &str, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let dir = self.existing_dir(partition).await?;
        let meta_path = Self::meta_path(&dir, key);
        let _guard = self.writes.lock().await;
        let previous = Self::read_meta(&meta_path).await.ok().flatten();

        let (status, headers, body_file) = match entry.response {
            Some(response) => {
                let name = format!("{}.{}.{}", Self::entry_stem(key), next_file_id(), BODY_EXT);
                let path = dir.join(&name);
                fs::write(&path, &response.body)
                    .await
                    .map_err(CacheError::io(&path))?;
                (Some(response.status), response.headers, Some(name))
            }
            None => (None, Headers::new(), None),
        };

        let meta = EntryFile {
            key: key.to_string(),
            request: entry.request,
            status,
            headers,
            body_file,
            stored_at: entry.stored_at,
            attempts: entry.attempts,
        };
        Self::write_atomic(&meta_path, &serde_json::to_vec_pretty(&meta)?).await?;

        if let Some(old) = previous.and_then(|p| p.body_file) {
            if meta.body_file.as_deref() != Some(old.as_str()) {
                Self::remove_body(&dir, &old).await;
            }
        }
        Ok(())
    }

    async fn delete(&self, partition: &str, key: &str) -> Result<bool, CacheError> {
        let dir = self.existing_dir(partition).await?;
        let meta_path = Self::meta_path(&dir, key);
        let _guard = self.writes.lock().await;
        let meta = match Self::read_meta(&meta_path).await {
            Ok(meta) => meta,
            Err(CacheError::Serde(e)) => {
                warn!(key = key, error = %e, "Deleting corrupt cache entry");
                None
            }
            Err(e) => return Err(e),
        };

        match fs::remove_file(&meta_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(CacheError::Io { path: meta_path, source: e }),
        }
        if let Some(body_file) = meta.and_then(|m| m.body_file) {
            Self::remove_body(&dir, &body_file).await;
        }
        Ok(true)
    }

    async fn keys(&self, partition: &str) -> Result<Vec<String>, CacheError> {
        let dir = self.existing_dir(partition).await?;
        let mut keys = Vec::new();
        let mut listing = fs::read_dir(&dir).await.map_err(CacheError::io(&dir))?;
        while let Some(entry) = listing.next_entry().await.map_err(CacheError::io(&dir))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXT) {
                continue;
            }
            match Self::read_meta(&path).await {
                Ok(Some(meta)) => keys.push(meta.key),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}
