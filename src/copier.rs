//! Incremental copier: hash-diffed copy with deletion, CoW-preferred
//! file writes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{PlunkError, Result};
use crate::hash::{hash_file, normalize_rel_path};

/// Totals from an [`incremental_copy`] run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyResult {
    pub copied: usize,
    pub removed: usize,
    pub skipped: usize,
}

/// Copy `src_dir` into `dest_dir`, only touching files whose content
/// changed, and removing destination files with no source counterpart.
pub async fn incremental_copy(src_dir: &Path, dest_dir: &Path, concurrency: usize) -> Result<CopyResult> {
    let dest_existed = tokio::fs::try_exists(dest_dir).await.unwrap_or(false);
    tokio::fs::create_dir_all(dest_dir).await?;

    let src_files = enumerate_files(src_dir);
    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
    let copied = Arc::new(AtomicUsize::new(0));
    let skipped = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::with_capacity(src_files.len());
    let mut rel_paths = HashSet::with_capacity(src_files.len());

    for src_path in src_files {
        let rel = src_path.strip_prefix(src_dir).unwrap_or(&src_path).to_path_buf();
        let rel_str = normalize_rel_path(&rel);
        rel_paths.insert(rel_str.clone());

        let dest_path = dest_dir.join(&rel);
        let semaphore = Arc::clone(&semaphore);
        let copied = Arc::clone(&copied);
        let skipped = Arc::clone(&skipped);

        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            copy_one(&src_path, &dest_path, &copied, &skipped).await
        }));
    }

    for task in tasks {
        task.await.map_err(|e| PlunkError::Other(e.to_string()))??;
    }

    let removed = if dest_existed {
        remove_orphans(dest_dir, &rel_paths).await?
    } else {
        0
    };

    Ok(CopyResult {
        copied: copied.load(Ordering::Relaxed),
        removed,
        skipped: skipped.load(Ordering::Relaxed),
    })
}

async fn copy_one(
    src_path: &Path,
    dest_path: &Path,
    copied: &AtomicUsize,
    skipped: &AtomicUsize,
) -> Result<()> {
    let dest_exists = tokio::fs::try_exists(dest_path).await.unwrap_or(false);

    let (src_hash, dest_hash) = if dest_exists {
        let src_fut = hash_file(src_path, None);
        let dest_fut = hash_file(dest_path, None);
        let (src_hash, dest_hash) = tokio::join!(src_fut, dest_fut);
        (src_hash?, Some(dest_hash?))
    } else {
        (hash_file(src_path, None).await?, None)
    };

    if dest_hash.as_deref() == Some(src_hash.as_str()) {
        skipped.fetch_add(1, Ordering::Relaxed);
        return Ok(());
    }

    if let Some(parent) = dest_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let src_path = src_path.to_path_buf();
    let dest_path_owned = dest_path.to_path_buf();
    tokio::task::spawn_blocking(move || copy_cow(&src_path, &dest_path_owned))
        .await
        .map_err(|e| PlunkError::Other(e.to_string()))??;

    copied.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

/// Copy-on-write when the filesystem supports it (`FICLONE` on Linux,
/// `clonefile` on macOS via the `reflink-copy` crate); falls back to a
/// normal byte copy otherwise.
pub(crate) fn copy_cow(src: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        std::fs::remove_file(dest)?;
    }
    match reflink_copy::reflink(src, dest) {
        Ok(()) => {
            debug!("reflinked {} -> {}", src.display(), dest.display());
            Ok(())
        }
        Err(_) => {
            std::fs::copy(src, dest)?;
            Ok(())
        }
    }
}

/// Run [`copy_cow`] on a blocking thread, for callers that already hold an
/// async context (used by the publisher file sync).
pub(crate) async fn copy_cow_blocking(src: PathBuf, dest: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || copy_cow(&src, &dest))
        .await
        .map_err(|e| PlunkError::Other(e.to_string()))?
}

pub(crate) async fn remove_orphans(dest_dir: &Path, keep: &HashSet<String>) -> Result<usize> {
    let dest_files = enumerate_files(dest_dir);
    let mut removed = 0;

    for dest_path in dest_files {
        let rel = dest_path.strip_prefix(dest_dir).unwrap_or(&dest_path);
        let rel_str = normalize_rel_path(rel);
        if !keep.contains(&rel_str) {
            tokio::fs::remove_file(&dest_path).await?;
            removed += 1;
        }
    }

    Ok(removed)
}

/// List every regular file under `root`, recursively, following symlinks
/// (read as regular files, never written back as links).
pub(crate) fn enumerate_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}
