//! Store: a content-addressed, metadata-tagged directory set with
//! atomic writes, owned exclusively by the publisher.
//!
//! Layout under the store root:
//! ```text
//! store/
//!   <encoded_name>@<version>/
//!     package/…          the published file tree
//!     .plunk-meta.json   metadata, written atomically
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::encode;
use crate::error::{PlunkError, Result};

const META_FILENAME: &str = ".plunk-meta.json";
const PACKAGE_DIRNAME: &str = "package";

/// Metadata attached to a store entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreMeta {
    pub content_hash: String,
    pub published_at: String,
    pub source_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
}

impl StoreMeta {
    /// All fields must be non-empty; a malformed meta file is treated as
    /// absent rather than propagated as an error.
    fn is_valid(&self) -> bool {
        !self.content_hash.is_empty() && !self.published_at.is_empty() && !self.source_path.is_empty()
    }
}

/// A fully resolved store entry: metadata plus the directory holding the
/// published files.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    pub name: String,
    pub version: String,
    pub package_dir: PathBuf,
    pub meta: StoreMeta,
}

/// The content-addressed package store.
#[derive(Debug, Clone)]
pub struct Store {
    store_dir: PathBuf,
}

impl Store {
    pub fn new(store_dir: PathBuf) -> Self {
        Self { store_dir }
    }

    fn entry_dir(&self, name: &str, version: &str) -> PathBuf {
        self.store_dir.join(format!("{}@{}", encode::encode(name), version))
    }

    /// Absolute path to the `package/` subdirectory of an entry.
    pub fn package_dir(&self, name: &str, version: &str) -> PathBuf {
        self.entry_dir(name, version).join(PACKAGE_DIRNAME)
    }

    fn meta_path(&self, name: &str, version: &str) -> PathBuf {
        self.entry_dir(name, version).join(META_FILENAME)
    }

    /// The path other components should lock on for mutations to this
    /// entry (guards publisher writes).
    pub fn lock_path(&self, name: &str, version: &str) -> PathBuf {
        self.entry_dir(name, version)
    }

    /// Read an entry's metadata, or `None` if missing or invalid.
    pub async fn read_meta(&self, name: &str, version: &str) -> Option<StoreMeta> {
        let path = self.meta_path(name, version);
        let content = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice::<StoreMeta>(&content) {
            Ok(meta) if meta.is_valid() => Some(meta),
            Ok(_) => {
                let corruption = PlunkError::Corruption {
                    path: path.clone(),
                    reason: "one or more required fields are empty".to_string(),
                };
                warn!("{corruption}, treating as absent");
                None
            }
            Err(e) => {
                let corruption = PlunkError::Corruption {
                    path: path.clone(),
                    reason: e.to_string(),
                };
                warn!("{corruption}, treating as absent");
                None
            }
        }
    }

    /// Write an entry's metadata atomically: creates the entry directory
    /// with owner-only permissions if needed, writes to a temp sibling,
    /// fsyncs, then renames over the canonical filename.
    pub async fn write_meta(&self, name: &str, version: &str, meta: &StoreMeta) -> Result<()> {
        let entry_dir = self.entry_dir(name, version);
        tokio::fs::create_dir_all(&entry_dir).await?;
        set_owner_only(&entry_dir).await?;

        crate::atomic::write_json(&self.meta_path(name, version), meta).await
    }

    /// A fully resolved entry, only if both the metadata and the `package/`
    /// directory exist.
    pub async fn get_store_entry(&self, name: &str, version: &str) -> Option<StoreEntry> {
        let meta = self.read_meta(name, version).await?;
        let package_dir = self.package_dir(name, version);
        if !tokio::fs::try_exists(&package_dir).await.unwrap_or(false) {
            return None;
        }
        Some(StoreEntry {
            name: name.to_string(),
            version: version.to_string(),
            package_dir,
            meta,
        })
    }

    /// Find the most recently published entry for `name`, across all
    /// versions in the store.
    pub async fn find_store_entry(&self, name: &str) -> Option<StoreEntry> {
        let prefix = format!("{}@", encode::encode(name));
        let mut read_dir = tokio::fs::read_dir(&self.store_dir).await.ok()?;

        let mut candidates = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(version) = file_name.strip_prefix(&prefix) {
                candidates.push(version.to_string());
            }
        }

        let mut resolved = Vec::new();
        for version in candidates {
            if let Some(entry) = self.get_store_entry(name, &version).await {
                resolved.push(entry);
            }
        }

        resolved.into_iter().max_by(|a, b| a.meta.published_at.cmp(&b.meta.published_at))
    }

    /// List every valid entry in the store.
    pub async fn list_store_entries(&self) -> Result<Vec<StoreEntry>> {
        if !tokio::fs::try_exists(&self.store_dir).await? {
            return Ok(Vec::new());
        }

        let mut read_dir = tokio::fs::read_dir(&self.store_dir).await?;
        let mut entries = Vec::new();

        while let Some(dir_entry) = read_dir.next_entry().await? {
            if !dir_entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let file_name = dir_entry.file_name();
            let file_name = file_name.to_string_lossy();

            let Some((encoded_name, version)) = file_name.rsplit_once('@') else {
                continue;
            };
            let name = encode::decode(encoded_name);

            if let Some(entry) = self.get_store_entry(&name, version).await {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    /// Recursively delete an entry, ignoring absence.
    pub async fn remove_store_entry(&self, name: &str, version: &str) -> Result<()> {
        let entry_dir = self.entry_dir(name, version);
        match tokio::fs::remove_dir_all(&entry_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PlunkError::Io(e)),
        }
    }
}

#[cfg(unix)]
async fn set_owner_only(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = tokio::fs::metadata(dir).await?.permissions();
    perms.set_mode(0o700);
    tokio::fs::set_permissions(dir, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_owner_only(_dir: &Path) -> Result<()> {
    Ok(())
}
