//! File hasher: stable per-file and aggregate digests.
//!
//! Small files get a cheap non-cryptographic digest; large files get a
//! streamed cryptographic one, so we're not burning SHA-256 work hashing
//! thousands of tiny files during a publish, but we never cryptographically
//! under-hash anything client code might treat as load-bearing (large
//! bundles, binaries).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use xxhash_rust::xxh64::xxh64;

use crate::error::Result;

/// Files at or below this size are hashed with XXH64; above it, SHA-256.
pub const SMALL_FILE_THRESHOLD: u64 = 1024 * 1024;

/// Prefix tag for the aggregate content hash, bumped if the canonical
/// record format ever changes.
pub const CONTENT_HASH_TAG: &str = "sha256v2:";

/// Read buffer size for streaming the large-file tier.
const STREAM_CHUNK: usize = 64 * 1024;

/// Hash a single file, picking the tier from its size.
///
/// `size` is an optional pre-known size (e.g. from a prior `stat`) to avoid
/// a redundant metadata syscall; if absent it is queried here.
pub async fn hash_file(path: &Path, size: Option<u64>) -> Result<String> {
    let size = match size {
        Some(s) => s,
        None => tokio::fs::metadata(path).await?.len(),
    };

    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || hash_file_sync(&path, size))
        .await
        .map_err(|e| crate::error::PlunkError::Other(e.to_string()))?
}

fn hash_file_sync(path: &Path, size: u64) -> Result<String> {
    if size <= SMALL_FILE_THRESHOLD {
        let data = std::fs::read(path)?;
        let digest = xxh64(&data, 0);
        Ok(format!("{:016x}", digest))
    } else {
        use std::io::Read;
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; STREAM_CHUNK];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Normalize a path's separators to `/` for stable cross-platform hashing
/// and display.
pub fn normalize_rel_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Compute the deterministic aggregate content hash over a set of files.
///
/// Order-independent: the entries are sorted by relative path before being
/// fed into the accumulator, so permuting `files` never changes the result.
pub async fn compute_content_hash(files: &[PathBuf], root_dir: &Path, concurrency: usize) -> Result<String> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = Vec::with_capacity(files.len());

    for file in files {
        let file = file.clone();
        let root_dir = root_dir.to_path_buf();
        let semaphore = Arc::clone(&semaphore);
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            let meta = tokio::fs::metadata(&file).await?;
            let size = meta.len();
            let per_file_hash = hash_file(&file, Some(size)).await?;
            let rel = file
                .strip_prefix(&root_dir)
                .unwrap_or(&file);
            Ok::<_, crate::error::PlunkError>((normalize_rel_path(rel), size, per_file_hash))
        }));
    }

    let mut entries = Vec::with_capacity(tasks.len());
    for task in tasks {
        let entry = task
            .await
            .map_err(|e| crate::error::PlunkError::Other(e.to_string()))??;
        entries.push(entry);
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (rel_path, size, per_file_hex) in &entries {
        hasher.update(rel_path.as_bytes());
        hasher.update(b"\n");
        hasher.update(size.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(per_file_hex.as_bytes());
        hasher.update(b"\n");
    }

    Ok(format!("{}{}", CONTENT_HASH_TAG, hex::encode(hasher.finalize())))
}
