//! Package-manager layout resolver: maps `(consumer, package, pm)` to
//! the on-disk directory the injector must materialize files into.

use std::path::{Path, PathBuf};

use crate::encode;
use crate::error::Result;
use crate::tracker::PackageManager;

/// Resolve the absolute install directory for `package_name` inside
/// `consumer_path`, honoring `pm`'s on-disk conventions.
pub async fn resolve_install_dir(
    consumer_path: &Path,
    package_name: &str,
    pm: PackageManager,
) -> Result<PathBuf> {
    let direct = consumer_path.join("node_modules").join(package_name);

    match pm {
        PackageManager::Npm | PackageManager::Yarn | PackageManager::Bun => Ok(direct),
        PackageManager::Pnpm => resolve_pnpm_layout(consumer_path, package_name, &direct).await,
    }
}

async fn resolve_pnpm_layout(consumer_path: &Path, package_name: &str, direct: &Path) -> Result<PathBuf> {
    // 1. If the top-level entry is already a symlink, follow it.
    if let Ok(meta) = tokio::fs::symlink_metadata(direct).await {
        if meta.file_type().is_symlink() {
            if let Ok(target) = tokio::fs::read_link(direct).await {
                let resolved = if target.is_absolute() {
                    target
                } else {
                    direct.parent().unwrap_or(direct).join(target)
                };
                return Ok(resolved);
            }
        }
    }

    // 2. Scan the virtual store for a matching entry.
    let virtual_store = consumer_path.join("node_modules").join(".pnpm");
    let prefix = format!("{}@", encode::encode(package_name));

    if let Ok(mut read_dir) = tokio::fs::read_dir(&virtual_store).await {
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if !file_name.starts_with(&prefix) {
                continue;
            }
            let candidate = entry.path().join("node_modules").join(package_name);
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(candidate);
            }
        }
    }

    // 3. Fall back to the direct path.
    Ok(direct.to_path_buf())
}
