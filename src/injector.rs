//! Injector: composes the layout resolver, incremental copier, and
//! bin-linking/bundler-cache-invalidation steps that materialize a store
//! entry into a consumer's dependency tree.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::copier::{incremental_copy, CopyResult};
use crate::encode;
use crate::error::Result;
use crate::layout::resolve_install_dir;
use crate::manifest::PackageManifest;
use crate::store::StoreEntry;
use crate::tracker::PackageManager;

/// Bundler cache directories invalidated after an inject, relative to the
/// consumer root.
const BUNDLER_CACHES: &[&str] = &["node_modules/.vite", ".next/cache", "node_modules/.cache"];

#[derive(Debug, Clone, Default)]
pub struct InjectOptions {
    /// Snapshot the install directory's current contents before overwriting,
    /// restorable later via `restore_backup`. Only set on the initial `add`.
    pub backup_existing: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InjectResult {
    pub copied: usize,
    pub removed: usize,
    pub skipped: usize,
    pub bin_links: Vec<String>,
    /// Whether a pre-inject backup was actually taken (only possible when
    /// `InjectOptions::backup_existing` was set and an install already
    /// existed to snapshot).
    pub backed_up: bool,
}

/// Materialize `entry` into `consumer_path`'s dependency tree for package
/// manager `pm`.
pub async fn inject(
    entry: &StoreEntry,
    consumer_path: &Path,
    pm: PackageManager,
    concurrency: usize,
    options: InjectOptions,
) -> Result<InjectResult> {
    let install_dir = resolve_install_dir(consumer_path, &entry.name, pm).await?;

    let backed_up = if options.backup_existing && tokio::fs::try_exists(&install_dir).await.unwrap_or(false) {
        backup_install_dir(consumer_path, &entry.name, &install_dir).await?;
        true
    } else {
        false
    };

    tokio::fs::create_dir_all(&install_dir).await?;
    let CopyResult { copied, removed, skipped } =
        incremental_copy(&entry.package_dir, &install_dir, concurrency).await?;

    let bin_links = link_bins(consumer_path, &install_dir).await?;
    invalidate_bundler_caches(consumer_path).await;

    Ok(InjectResult { copied, removed, skipped, bin_links, backed_up })
}

/// Resolve `name`'s install directory and remove it along with its bin
/// shims, undoing a prior `inject`.
pub async fn remove_injected(consumer_path: &Path, name: &str, pm: PackageManager) -> Result<()> {
    let install_dir = resolve_install_dir(consumer_path, name, pm).await?;

    if let Ok(manifest) = PackageManifest::read_from_dir(&install_dir) {
        let bin_dir = consumer_path.join("node_modules").join(".bin");
        for (command, _) in manifest.bin_entries() {
            remove_bin_shim(&bin_dir, &command).await;
        }
    }

    match tokio::fs::remove_dir_all(&install_dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Undo the backup taken by an initial `add`: remove the current install,
/// move the backup into its place, then delete the now-empty backup dir.
pub async fn restore_backup(consumer_path: &Path, name: &str, pm: PackageManager) -> Result<()> {
    let install_dir = resolve_install_dir(consumer_path, name, pm).await?;
    let backup_dir = backup_path(consumer_path, name);

    if !tokio::fs::try_exists(&backup_dir).await.unwrap_or(false) {
        return Err(crate::error::PlunkError::not_found(format!(
            "no backup to restore for {name}"
        )));
    }

    if tokio::fs::try_exists(&install_dir).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(&install_dir).await?;
    }
    if let Some(parent) = install_dir.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(&backup_dir, &install_dir).await?;
    Ok(())
}

fn backup_path(consumer_path: &Path, name: &str) -> PathBuf {
    consumer_path.join(".plunk").join("backup").join(encode::encode(name))
}

async fn backup_install_dir(consumer_path: &Path, name: &str, install_dir: &Path) -> Result<()> {
    let backup_dir = backup_path(consumer_path, name);
    if let Some(parent) = backup_dir.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::try_exists(&backup_dir).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(&backup_dir).await?;
    }
    copy_dir_recursive(install_dir, &backup_dir).await
}

async fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dest).await?;
    let mut entries = tokio::fs::read_dir(src).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_type = entry.file_type().await?;
        let dest_path = dest.join(entry.file_name());
        if file_type.is_dir() {
            Box::pin(copy_dir_recursive(&entry.path(), &dest_path)).await?;
        } else if file_type.is_file() {
            tokio::fs::copy(entry.path(), &dest_path).await?;
        }
    }
    Ok(())
}

/// Create a launcher in `<consumer>/node_modules/.bin/` for every `bin`
/// entry in the package just installed at `install_dir`.
async fn link_bins(consumer_path: &Path, install_dir: &Path) -> Result<Vec<String>> {
    let manifest = match PackageManifest::read_from_dir(install_dir) {
        Ok(m) => m,
        Err(_) => return Ok(Vec::new()),
    };

    let bin_entries = manifest.bin_entries();
    if bin_entries.is_empty() {
        return Ok(Vec::new());
    }

    let bin_dir = consumer_path.join("node_modules").join(".bin");
    tokio::fs::create_dir_all(&bin_dir).await?;

    let mut linked = Vec::with_capacity(bin_entries.len());
    for (command, rel_path) in bin_entries {
        let target = install_dir.join(&rel_path);
        create_bin_shim(&bin_dir, &command, &target).await?;
        linked.push(command);
    }
    Ok(linked)
}

#[cfg(unix)]
async fn create_bin_shim(bin_dir: &Path, command: &str, target: &Path) -> Result<()> {
    let link_path = bin_dir.join(command);
    if tokio::fs::try_exists(&link_path).await.unwrap_or(false) {
        tokio::fs::remove_file(&link_path).await?;
    }
    tokio::fs::symlink(target, &link_path).await?;

    if tokio::fs::try_exists(target).await.unwrap_or(false) {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tokio::fs::metadata(target).await?.permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(target, perms).await?;
    }
    debug!("linked bin {command} -> {}", target.display());
    Ok(())
}

#[cfg(not(unix))]
async fn create_bin_shim(bin_dir: &Path, command: &str, target: &Path) -> Result<()> {
    let cmd_path = bin_dir.join(format!("{command}.cmd"));
    let ps1_path = bin_dir.join(format!("{command}.ps1"));
    tokio::fs::write(&cmd_path, format!("@echo off\r\nnode \"{}\" %*\r\n", target.display())).await?;
    tokio::fs::write(
        &ps1_path,
        format!("#!/usr/bin/env pwsh\n& node \"{}\" @args\n", target.display()),
    )
    .await?;
    Ok(())
}

#[cfg(unix)]
async fn remove_bin_shim(bin_dir: &Path, command: &str) {
    let _ = tokio::fs::remove_file(bin_dir.join(command)).await;
}

#[cfg(not(unix))]
async fn remove_bin_shim(bin_dir: &Path, command: &str) {
    let _ = tokio::fs::remove_file(bin_dir.join(format!("{command}.cmd"))).await;
    let _ = tokio::fs::remove_file(bin_dir.join(format!("{command}.ps1"))).await;
}

/// Delete recognizable bundler caches so a stale build doesn't serve old
/// bytes from the just-injected package. Failures (locked directories) are
/// logged, never fatal.
async fn invalidate_bundler_caches(consumer_path: &Path) {
    for cache in BUNDLER_CACHES {
        let path = consumer_path.join(cache);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                warn!("could not invalidate bundler cache {}: {e}", path.display());
            } else {
                debug!("invalidated bundler cache {}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, StoreMeta};
    use tempfile::tempdir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    async fn seeded_entry(root: &Path) -> StoreEntry {
        let store = Store::new(root.join("store"));
        let package_dir = store.package_dir("acme", "1.0.0");
        write(&package_dir, "package.json", r#"{"name":"acme","version":"1.0.0"}"#);
        write(&package_dir, "index.js", "export const x=1;");
        store
            .write_meta(
                "acme",
                "1.0.0",
                &StoreMeta {
                    content_hash: "sha256v2:abc".into(),
                    published_at: "2024-01-01T00:00:00Z".into(),
                    source_path: "/src/acme".into(),
                    build_id: None,
                },
            )
            .await
            .unwrap();
        store.get_store_entry("acme", "1.0.0").await.unwrap()
    }

    #[tokio::test]
    async fn inject_materializes_files_into_npm_layout() {
        let root = tempdir().unwrap();
        let entry = seeded_entry(root.path()).await;
        let consumer = root.path().join("consumer");
        std::fs::create_dir_all(&consumer).unwrap();

        let result = inject(&entry, &consumer, PackageManager::Npm, 4, InjectOptions::default())
            .await
            .unwrap();

        assert_eq!(result.copied, 2);
        assert_eq!(
            std::fs::read_to_string(consumer.join("node_modules/acme/index.js")).unwrap(),
            "export const x=1;"
        );
    }

    #[tokio::test]
    async fn inject_links_bin_entries() {
        let root = tempdir().unwrap();
        let store = Store::new(root.path().join("store"));
        let package_dir = store.package_dir("tool", "1.0.0");
        write(&package_dir, "package.json", r#"{"name":"tool","version":"1.0.0","bin":"bin/cli.js"}"#);
        write(&package_dir, "bin/cli.js", "#!/usr/bin/env node\nconsole.log(1);");
        store
            .write_meta(
                "tool",
                "1.0.0",
                &StoreMeta {
                    content_hash: "sha256v2:abc".into(),
                    published_at: "2024-01-01T00:00:00Z".into(),
                    source_path: "/src/tool".into(),
                    build_id: None,
                },
            )
            .await
            .unwrap();
        let entry = store.get_store_entry("tool", "1.0.0").await.unwrap();

        let consumer = root.path().join("consumer");
        std::fs::create_dir_all(&consumer).unwrap();
        let result = inject(&entry, &consumer, PackageManager::Npm, 4, InjectOptions::default())
            .await
            .unwrap();

        assert_eq!(result.bin_links, vec!["tool".to_string()]);
        #[cfg(unix)]
        assert!(consumer.join("node_modules/.bin/tool").exists());
    }

    #[tokio::test]
    async fn backup_then_restore_round_trips_prior_install() {
        let root = tempdir().unwrap();
        let entry = seeded_entry(root.path()).await;
        let consumer = root.path().join("consumer");
        write(&consumer, "node_modules/acme/index.js", "export const x=0; // prior install");

        inject(
            &entry,
            &consumer,
            PackageManager::Npm,
            4,
            InjectOptions { backup_existing: true },
        )
        .await
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(consumer.join("node_modules/acme/index.js")).unwrap(),
            "export const x=1;"
        );

        restore_backup(&consumer, "acme", PackageManager::Npm).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(consumer.join("node_modules/acme/index.js")).unwrap(),
            "export const x=0; // prior install"
        );
    }

    #[tokio::test]
    async fn remove_injected_deletes_install_dir_and_bin_shim() {
        let root = tempdir().unwrap();
        let store = Store::new(root.path().join("store"));
        let package_dir = store.package_dir("tool", "1.0.0");
        write(&package_dir, "package.json", r#"{"name":"tool","version":"1.0.0","bin":"bin/cli.js"}"#);
        write(&package_dir, "bin/cli.js", "console.log(1);");
        store
            .write_meta(
                "tool",
                "1.0.0",
                &StoreMeta {
                    content_hash: "sha256v2:abc".into(),
                    published_at: "2024-01-01T00:00:00Z".into(),
                    source_path: "/src/tool".into(),
                    build_id: None,
                },
            )
            .await
            .unwrap();
        let entry = store.get_store_entry("tool", "1.0.0").await.unwrap();

        let consumer = root.path().join("consumer");
        std::fs::create_dir_all(&consumer).unwrap();
        inject(&entry, &consumer, PackageManager::Npm, 4, InjectOptions::default())
            .await
            .unwrap();

        remove_injected(&consumer, "tool", PackageManager::Npm).await.unwrap();
        assert!(!consumer.join("node_modules/tool").exists());
        #[cfg(unix)]
        assert!(!consumer.join("node_modules/.bin/tool").exists());
    }

    #[tokio::test]
    async fn invalidates_vite_cache_after_inject() {
        let root = tempdir().unwrap();
        let entry = seeded_entry(root.path()).await;
        let consumer = root.path().join("consumer");
        write(&consumer, "node_modules/.vite/stale", "stale");

        inject(&entry, &consumer, PackageManager::Npm, 4, InjectOptions::default())
            .await
            .unwrap();

        assert!(!consumer.join("node_modules/.vite").exists());
    }
}
