//! Publisher: composes the pack-list resolver, hasher, and store into
//! skip-if-unchanged publish with atomic promotion and lifecycle hooks.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{PlunkError, Result};
use crate::hash::{compute_content_hash, normalize_rel_path};
use crate::manifest::PackageManifest;
use crate::packlist::resolve_pack_list;
use crate::store::{Store, StoreMeta};
use crate::{copier, lock, scripts};

/// Options controlling a single publish.
#[derive(Debug, Clone, Copy)]
pub struct PublishOptions {
    /// Publish a `private: true` package anyway.
    pub allow_private: bool,
    /// Run `prepack`/`postpack` scripts if present.
    pub run_scripts: bool,
    /// Skip the hash-equality short circuit and always rewrite store files.
    pub force: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            allow_private: false,
            run_scripts: true,
            force: false,
        }
    }
}

/// Outcome of a publish attempt.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub name: String,
    pub version: String,
    pub content_hash: String,
    pub skipped: bool,
}

/// Publish `package_dir` into `store`: validate the manifest, run
/// `prepack`, resolve and hash the pack list, sync changed files into the
/// store (skipping if the content hash is unchanged and `force` isn't set),
/// write metadata, then run `postpack`.
pub async fn publish(
    store: &Store,
    package_dir: &Path,
    concurrency: usize,
    options: PublishOptions,
) -> Result<PublishOutcome> {
    let manifest = PackageManifest::read_from_dir(package_dir)?;
    let (name, version) = manifest.identity();

    if manifest.is_private() && !options.allow_private {
        return Err(PlunkError::PublishRefused { name });
    }

    if options.run_scripts {
        if let Some(script) = manifest.get_script("prepack") {
            scripts::run_script(package_dir, "prepack", script).await?;
        }
    }

    let pack_list = resolve_pack_list(package_dir, &manifest)?;
    let content_hash = compute_content_hash(&pack_list, package_dir, concurrency).await?;

    let lock_path = store.lock_path(&name, &version);
    let name_for_lock = name.clone();
    let version_for_lock = version.clone();
    let store = store.clone();
    let package_dir = package_dir.to_path_buf();
    let source_path = package_dir.to_string_lossy().into_owned();
    let content_hash_for_lock = content_hash.clone();
    let force = options.force;

    let skipped = lock::with_lock(&lock_path, move || async move {
        let existing = store.read_meta(&name_for_lock, &version_for_lock).await;
        if !force {
            if let Some(existing) = &existing {
                if existing.content_hash == content_hash_for_lock {
                    info!("{}@{} unchanged, skipping publish", name_for_lock, version_for_lock);
                    return Ok(true);
                }
            }
        }

        let dest_dir = store.package_dir(&name_for_lock, &version_for_lock);
        sync_pack_list(&pack_list, &package_dir, &dest_dir, concurrency).await?;

        let meta = StoreMeta {
            content_hash: content_hash_for_lock,
            published_at: chrono::Utc::now().to_rfc3339(),
            source_path,
            build_id: None,
        };
        store.write_meta(&name_for_lock, &version_for_lock, &meta).await?;
        Ok(false)
    })
    .await?;

    if options.run_scripts && !skipped {
        if let Some(script) = manifest.get_script("postpack") {
            scripts::run_script(&package_dir, "postpack", script).await?;
        }
    }

    Ok(PublishOutcome {
        name,
        version,
        content_hash,
        skipped,
    })
}

/// Copy every file in `pack_list` (absolute paths under `package_dir`) into
/// `dest_dir`, preserving relative layout, then remove any destination file
/// with no corresponding pack-list entry so a shrinking `files` field or a
/// deleted source file never leaves stale bytes in the store.
async fn sync_pack_list(pack_list: &[PathBuf], package_dir: &Path, dest_dir: &Path, concurrency: usize) -> Result<()> {
    tokio::fs::create_dir_all(dest_dir).await?;

    let semaphore = std::sync::Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
    let mut tasks = Vec::with_capacity(pack_list.len());
    let mut keep = HashSet::with_capacity(pack_list.len());

    for src_path in pack_list {
        let rel = src_path.strip_prefix(package_dir).unwrap_or(src_path).to_path_buf();
        keep.insert(normalize_rel_path(&rel));

        let dest_path = dest_dir.join(&rel);
        let src_path = src_path.clone();
        let semaphore = std::sync::Arc::clone(&semaphore);

        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            if let Some(parent) = dest_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            copier::copy_cow_blocking(src_path, dest_path).await
        }));
    }

    for task in tasks {
        task.await.map_err(|e| PlunkError::Other(e.to_string()))??;
    }

    copier::remove_orphans(dest_dir, &keep).await?;
    Ok(())
}
