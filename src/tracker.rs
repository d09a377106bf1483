//! Tracker: the per-consumer link-state file and the global
//! package-to-consumers registry, plus the garbage-collection invariants
//! tying them together.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PlunkError, Result};
use crate::lock;

const CONSUMER_STATE_VERSION: &str = "1";

/// Package manager a consumer is using, affecting layout resolution (npm/yarn/bun flat vs pnpm virtual store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

/// One consumer's record of a linked package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkEntry {
    pub version: String,
    pub content_hash: String,
    pub linked_at: String,
    pub source_path: String,
    pub backup_exists: bool,
    pub package_manager: PackageManager,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
}

/// A consumer's full link state, `<consumer>/.plunk/state.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsumerState {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<PackageManager>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub links: BTreeMap<String, LinkEntry>,
}

impl Default for ConsumerState {
    fn default() -> Self {
        Self {
            version: CONSUMER_STATE_VERSION.to_string(),
            package_manager: None,
            role: None,
            links: BTreeMap::new(),
        }
    }
}

fn state_path(consumer_path: &Path) -> PathBuf {
    consumer_path.join(".plunk").join("state.json")
}

fn state_lock_path(consumer_path: &Path) -> PathBuf {
    consumer_path.join(".plunk").join("state.json.lock-target")
}

/// Read a consumer's state. Absence or a version mismatch yields an empty
/// default state rather than an error.
pub async fn read_consumer_state(consumer_path: &Path) -> ConsumerState {
    let path = state_path(consumer_path);
    let Ok(content) = tokio::fs::read(&path).await else {
        return ConsumerState::default();
    };
    match serde_json::from_slice::<ConsumerState>(&content) {
        Ok(state) if state.version == CONSUMER_STATE_VERSION => state,
        Ok(state) => {
            let corruption = PlunkError::Corruption {
                path: path.clone(),
                reason: format!("unknown state version '{}'", state.version),
            };
            warn!("{corruption}, treating as empty");
            ConsumerState::default()
        }
        Err(e) => {
            let corruption = PlunkError::Corruption { path: path.clone(), reason: e.to_string() };
            warn!("{corruption}, treating as empty");
            ConsumerState::default()
        }
    }
}

async fn write_consumer_state(consumer_path: &Path, state: &ConsumerState) -> Result<()> {
    crate::atomic::write_json(&state_path(consumer_path), state).await
}

/// Get a single link entry, if present.
pub async fn get_link(consumer_path: &Path, name: &str) -> Option<LinkEntry> {
    read_consumer_state(consumer_path).await.links.get(name).cloned()
}

/// Add (or replace) a link entry for `name`. Concurrent writers on the same
/// consumer state file each take a lock keyed on that file.
pub async fn add_link(consumer_path: &Path, name: &str, entry: LinkEntry) -> Result<()> {
    let lock_path = state_lock_path(consumer_path);
    let consumer_path = consumer_path.to_path_buf();
    let name = name.to_string();
    lock::with_lock(&lock_path, || async move {
        let mut state = read_consumer_state(&consumer_path).await;
        state.links.insert(name, entry);
        write_consumer_state(&consumer_path, &state).await
    })
    .await
}

/// Remove a link entry for `name`, if present.
pub async fn remove_link(consumer_path: &Path, name: &str) -> Result<()> {
    let lock_path = state_lock_path(consumer_path);
    let consumer_path = consumer_path.to_path_buf();
    let name = name.to_string();
    lock::with_lock(&lock_path, || async move {
        let mut state = read_consumer_state(&consumer_path).await;
        state.links.remove(&name);
        write_consumer_state(&consumer_path, &state).await
    })
    .await
}

/// Normalize a path to forward-slash separators for registry storage.
fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// The global `packageName -> [consumerPath]` registry.
pub type ConsumersRegistry = BTreeMap<String, Vec<String>>;

/// Read the registry, treating a missing or corrupt file as empty.
pub async fn read_consumers_registry(registry_path: &Path) -> ConsumersRegistry {
    let Ok(content) = tokio::fs::read(registry_path).await else {
        return ConsumersRegistry::new();
    };
    match serde_json::from_slice(&content) {
        Ok(registry) => registry,
        Err(e) => {
            let corruption = PlunkError::Corruption { path: registry_path.to_path_buf(), reason: e.to_string() };
            warn!("{corruption}, treating as empty");
            ConsumersRegistry::new()
        }
    }
}

/// The set of consumers registered for `package_name`.
pub async fn get_consumers(registry_path: &Path, package_name: &str) -> Vec<String> {
    read_consumers_registry(registry_path)
        .await
        .get(package_name)
        .cloned()
        .unwrap_or_default()
}

/// Register `consumer_path` under `package_name`. Idempotent: re-registering
/// an already-present path is a no-op (O3: after return, `getConsumers`
/// includes it exactly once).
pub async fn register_consumer(
    registry_path: &Path,
    lock_path: &Path,
    package_name: &str,
    consumer_path: &Path,
) -> Result<()> {
    let registry_path = registry_path.to_path_buf();
    let lock_path = lock_path.to_path_buf();
    let package_name = package_name.to_string();
    let normalized = normalize_path(consumer_path);

    lock::with_lock(&lock_path, move || async move {
        let mut registry = read_consumers_registry(&registry_path).await;
        let paths = registry.entry(package_name).or_default();
        if !paths.iter().any(|p| p == &normalized) {
            paths.push(normalized);
        }
        crate::atomic::write_json(&registry_path, &registry).await
    })
    .await
}

/// Unregister `consumer_path` from `package_name`. An empty resulting array
/// is represented by removing the key entirely.
pub async fn unregister_consumer(
    registry_path: &Path,
    lock_path: &Path,
    package_name: &str,
    consumer_path: &Path,
) -> Result<()> {
    let registry_path = registry_path.to_path_buf();
    let lock_path = lock_path.to_path_buf();
    let package_name = package_name.to_string();
    let normalized = normalize_path(consumer_path);

    lock::with_lock(&lock_path, move || async move {
        let mut registry = read_consumers_registry(&registry_path).await;
        if let Some(paths) = registry.get_mut(&package_name) {
            paths.retain(|p| p != &normalized);
            if paths.is_empty() {
                registry.remove(&package_name);
            }
        }
        crate::atomic::write_json(&registry_path, &registry).await
    })
    .await
}

/// Prune registry entries whose consumer directory no longer exists, or
/// whose consumer state no longer lists the package among its links.
/// Returns `(removed_consumers, removed_packages)`.
pub async fn clean_stale_consumers(registry_path: &Path, lock_path: &Path) -> Result<(usize, usize)> {
    let registry_path = registry_path.to_path_buf();
    let lock_path = lock_path.to_path_buf();

    lock::with_lock(&lock_path, move || async move {
        let registry = read_consumers_registry(&registry_path).await;
        let mut pruned = ConsumersRegistry::new();
        let mut removed_consumers = 0usize;
        let mut removed_packages = 0usize;

        for (package_name, paths) in registry {
            let mut kept = Vec::new();
            for path in paths {
                let consumer_dir = PathBuf::from(&path);
                let dir_exists = tokio::fs::try_exists(&consumer_dir).await.unwrap_or(false);
                let still_linked = dir_exists
                    && read_consumer_state(&consumer_dir)
                        .await
                        .links
                        .contains_key(&package_name);

                if still_linked {
                    kept.push(path);
                } else {
                    removed_consumers += 1;
                }
            }

            if kept.is_empty() {
                removed_packages += 1;
            } else {
                pruned.insert(package_name, kept);
            }
        }

        crate::atomic::write_json(&registry_path, &pruned).await?;
        Ok((removed_consumers, removed_packages))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(version: &str) -> LinkEntry {
        LinkEntry {
            version: version.to_string(),
            content_hash: "sha256v2:abc".to_string(),
            linked_at: "2024-01-01T00:00:00Z".to_string(),
            source_path: "/src/acme".to_string(),
            backup_exists: false,
            package_manager: PackageManager::Npm,
            build_id: None,
        }
    }

    #[tokio::test]
    async fn absent_state_is_empty_default() {
        let dir = tempdir().unwrap();
        let state = read_consumer_state(dir.path()).await;
        assert_eq!(state.version, "1");
        assert!(state.links.is_empty());
    }

    #[tokio::test]
    async fn add_then_get_link_round_trips() {
        let dir = tempdir().unwrap();
        add_link(dir.path(), "acme", entry("1.0.0")).await.unwrap();
        let link = get_link(dir.path(), "acme").await.unwrap();
        assert_eq!(link.version, "1.0.0");
    }

    #[tokio::test]
    async fn add_then_remove_leaves_no_link() {
        let dir = tempdir().unwrap();
        add_link(dir.path(), "acme", entry("1.0.0")).await.unwrap();
        remove_link(dir.path(), "acme").await.unwrap();
        assert!(get_link(dir.path(), "acme").await.is_none());
    }

    #[tokio::test]
    async fn register_then_get_consumers_includes_path() {
        let dir = tempdir().unwrap();
        let registry_path = dir.path().join("consumers.json");
        let lock_path = dir.path().join("consumers.json.lock-target");
        let consumer = dir.path().join("project-a");

        register_consumer(&registry_path, &lock_path, "acme", &consumer).await.unwrap();
        let consumers = get_consumers(&registry_path, "acme").await;
        assert_eq!(consumers, vec![normalize_path(&consumer)]);
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let dir = tempdir().unwrap();
        let registry_path = dir.path().join("consumers.json");
        let lock_path = dir.path().join("consumers.json.lock-target");
        let consumer = dir.path().join("project-a");

        register_consumer(&registry_path, &lock_path, "acme", &consumer).await.unwrap();
        register_consumer(&registry_path, &lock_path, "acme", &consumer).await.unwrap();
        let consumers = get_consumers(&registry_path, "acme").await;
        assert_eq!(consumers.len(), 1);
    }

    #[tokio::test]
    async fn unregister_empties_key_removes_it() {
        let dir = tempdir().unwrap();
        let registry_path = dir.path().join("consumers.json");
        let lock_path = dir.path().join("consumers.json.lock-target");
        let consumer = dir.path().join("project-a");

        register_consumer(&registry_path, &lock_path, "acme", &consumer).await.unwrap();
        unregister_consumer(&registry_path, &lock_path, "acme", &consumer).await.unwrap();

        let registry = read_consumers_registry(&registry_path).await;
        assert!(!registry.contains_key("acme"));
    }

    #[tokio::test]
    async fn clean_removes_paths_with_no_live_link() {
        let dir = tempdir().unwrap();
        let registry_path = dir.path().join("consumers.json");
        let lock_path = dir.path().join("consumers.json.lock-target");
        let live_consumer = dir.path().join("project-live");
        let gone_consumer = dir.path().join("project-gone");

        std::fs::create_dir_all(&live_consumer).unwrap();
        add_link(&live_consumer, "acme", entry("1.0.0")).await.unwrap();

        register_consumer(&registry_path, &lock_path, "acme", &live_consumer).await.unwrap();
        register_consumer(&registry_path, &lock_path, "acme", &gone_consumer).await.unwrap();

        let (removed_consumers, removed_packages) =
            clean_stale_consumers(&registry_path, &lock_path).await.unwrap();
        assert_eq!(removed_consumers, 1);
        assert_eq!(removed_packages, 0);

        let consumers = get_consumers(&registry_path, "acme").await;
        assert_eq!(consumers, vec![normalize_path(&live_consumer)]);
    }

    #[tokio::test]
    async fn clean_removes_package_key_when_all_consumers_gone() {
        let dir = tempdir().unwrap();
        let registry_path = dir.path().join("consumers.json");
        let lock_path = dir.path().join("consumers.json.lock-target");
        let gone_consumer = dir.path().join("project-gone");

        register_consumer(&registry_path, &lock_path, "acme", &gone_consumer).await.unwrap();

        let (_, removed_packages) = clean_stale_consumers(&registry_path, &lock_path).await.unwrap();
        assert_eq!(removed_packages, 1);
        assert!(!read_consumers_registry(&registry_path).await.contains_key("acme"));
    }
}
