//! Cross-process file lock: an advisory lock scoped to a path, used to
//! serialize writes to store entries and the consumers registry across
//! processes.
//!
//! `mkdir` is atomic on every supported filesystem, so acquisition is a
//! `create_dir` on a `<path>.lock` directory; staleness is judged by that
//! directory's mtime.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{PlunkError, Result};

const BASE_DELAY_MS: u64 = 100;
const MAX_DELAY_MS: u64 = 1000;
const MAX_RETRIES: u32 = 5;
const STALE_AFTER: Duration = Duration::from_secs(10);

/// Execute `f` while holding the advisory lock for `lock_path`. The lock is
/// released on every exit path, including `f` returning an error.
pub async fn with_lock<F, Fut, T>(lock_path: &Path, f: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let _guard = acquire(lock_path).await?;
    f().await
}

/// RAII guard releasing the lock directory on drop.
struct LockGuard {
    lock_dir: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.lock_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to release lock at {}: {e}", self.lock_dir.display());
            }
        }
    }
}

fn lock_dir_for(lock_path: &Path) -> PathBuf {
    let mut os_string = lock_path.as_os_str().to_owned();
    os_string.push(".lock");
    PathBuf::from(os_string)
}

async fn acquire(lock_path: &Path) -> Result<LockGuard> {
    let lock_dir = lock_dir_for(lock_path);

    if let Some(parent) = lock_dir.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut attempt: u32 = 0;
    loop {
        match tokio::fs::create_dir(&lock_dir).await {
            Ok(()) => {
                // Empty backing artifact inside the lock dir, for operators
                // inspecting a stuck lock to see who's (nominally) holding
                // it; its mtime isn't load-bearing, the directory's is.
                let _ = tokio::fs::write(
                    lock_dir.join("owner"),
                    format!("pid={}\n", std::process::id()),
                )
                .await;
                debug!("acquired lock at {}", lock_dir.display());
                return Ok(LockGuard { lock_dir });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if is_stale(&lock_dir).await {
                    warn!(
                        "reclaiming stale lock at {} (older than {:?})",
                        lock_dir.display(),
                        STALE_AFTER
                    );
                    let _ = tokio::fs::remove_dir_all(&lock_dir).await;
                    attempt += 1;
                    if attempt > MAX_RETRIES {
                        return Err(busy(lock_path, &lock_dir));
                    }
                    continue;
                }

                if attempt >= MAX_RETRIES {
                    return Err(busy(lock_path, &lock_dir));
                }

                let delay = BASE_DELAY_MS.saturating_mul(1 << attempt).min(MAX_DELAY_MS);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(e) => return Err(PlunkError::Io(e)),
        }
    }
}

fn busy(lock_path: &Path, lock_dir: &Path) -> PlunkError {
    PlunkError::LockBusy {
        path: lock_path.to_path_buf(),
        hint: format!(
            "another process holds the lock at {} after {} retries",
            lock_dir.display(),
            MAX_RETRIES
        ),
    }
}

async fn is_stale(lock_dir: &Path) -> bool {
    let Ok(meta) = tokio::fs::metadata(lock_dir).await else {
        return false;
    };
    let Ok(mtime) = meta.modified() else {
        return false;
    };
    mtime.elapsed().map(|elapsed| elapsed > STALE_AFTER).unwrap_or(false)
}
