//! Push engine: republish a package, then fan out `inject` to every
//! consumer currently registered for it.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::injector::{self, InjectOptions, InjectResult};
use crate::publisher::{self, PublishOptions, PublishOutcome};
use crate::store::Store;
use crate::tracker;

/// One consumer's fan-out result: either it injected cleanly, or the
/// failure that was logged and swallowed so it doesn't abort the others.
#[derive(Debug)]
pub enum ConsumerPushResult {
    Injected { consumer_path: PathBuf, result: InjectResult },
    Failed { consumer_path: PathBuf, error: String },
    Skipped { consumer_path: PathBuf },
}

#[derive(Debug)]
pub struct PushOutcome {
    pub publish: PublishOutcome,
    pub consumers: Vec<ConsumerPushResult>,
}

/// Publish `package_dir` (whose manifest names `name`) and inject the
/// result into every consumer registered for `name`.
pub async fn push(
    config: &Config,
    package_dir: &std::path::Path,
    publish_options: PublishOptions,
) -> Result<PushOutcome> {
    let store = Store::new(config.store_dir());
    let publish_outcome = publisher::publish(&store, package_dir, config.concurrency, publish_options).await?;

    if publish_outcome.skipped {
        info!("{}@{}: no changes to push", publish_outcome.name, publish_outcome.version);
        return Ok(PushOutcome { publish: publish_outcome, consumers: Vec::new() });
    }

    let registry_path = config.consumers_registry_path();
    let consumer_paths = tracker::get_consumers(&registry_path, &publish_outcome.name).await;

    let Some(entry) = store.get_store_entry(&publish_outcome.name, &publish_outcome.version).await else {
        warn!(
            "{}@{} published but is not readable back from the store; skipping fan-out",
            publish_outcome.name, publish_outcome.version
        );
        return Ok(PushOutcome { publish: publish_outcome, consumers: Vec::new() });
    };

    let mut consumers = Vec::with_capacity(consumer_paths.len());
    for consumer_path_str in consumer_paths {
        let consumer_path = PathBuf::from(&consumer_path_str);

        // The registry may momentarily contain a stale entry between
        // `remove` and `clean`; a consumer with no live link is skipped
        // rather than treated as a failure.
        let Some(link) = tracker::get_link(&consumer_path, &publish_outcome.name).await else {
            consumers.push(ConsumerPushResult::Skipped { consumer_path });
            continue;
        };

        match injector::inject(
            &entry,
            &consumer_path,
            link.package_manager,
            config.concurrency,
            InjectOptions::default(),
        )
        .await
        {
            Ok(result) => {
                let updated = tracker::LinkEntry {
                    version: publish_outcome.version.clone(),
                    content_hash: publish_outcome.content_hash.clone(),
                    linked_at: chrono::Utc::now().to_rfc3339(),
                    ..link
                };
                if let Err(e) = tracker::add_link(&consumer_path, &publish_outcome.name, updated).await {
                    warn!("push: updated {} but failed to record link state: {e}", consumer_path.display());
                }
                consumers.push(ConsumerPushResult::Injected { consumer_path, result });
            }
            Err(e) => {
                warn!("push: inject into {} failed: {e}", consumer_path.display());
                consumers.push(ConsumerPushResult::Failed { consumer_path, error: e.to_string() });
            }
        }
    }

    Ok(PushOutcome { publish: publish_outcome, consumers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::PackageManager;
    use tempfile::tempdir;

    fn write(dir: &std::path::Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn push_with_no_registered_consumers_publishes_only() {
        let root = tempdir().unwrap();
        let package_dir = root.path().join("acme");
        write(&package_dir, "package.json", r#"{"name":"acme","version":"1.0.0"}"#);
        write(&package_dir, "index.js", "export const x=1;");

        let config = Config { data_dir: root.path().join("data"), ..Config::default() };
        let outcome = push(&config, &package_dir, PublishOptions::default()).await.unwrap();

        assert!(!outcome.publish.skipped);
        assert!(outcome.consumers.is_empty());
    }

    #[tokio::test]
    async fn push_fans_out_to_registered_consumer_with_a_live_link() {
        let root = tempdir().unwrap();
        let package_dir = root.path().join("acme");
        write(&package_dir, "package.json", r#"{"name":"acme","version":"1.0.0"}"#);
        write(&package_dir, "index.js", "export const x=1;");

        let config = Config { data_dir: root.path().join("data"), ..Config::default() };
        let consumer = root.path().join("consumer");
        std::fs::create_dir_all(&consumer).unwrap();

        tracker::register_consumer(
            &config.consumers_registry_path(),
            &config.consumers_registry_lock_path(),
            "acme",
            &consumer,
        )
        .await
        .unwrap();
        tracker::add_link(
            &consumer,
            "acme",
            tracker::LinkEntry {
                version: "0.0.0".into(),
                content_hash: "sha256v2:stale".into(),
                linked_at: "2024-01-01T00:00:00Z".into(),
                source_path: package_dir.to_string_lossy().into_owned(),
                backup_exists: false,
                package_manager: PackageManager::Npm,
                build_id: None,
            },
        )
        .await
        .unwrap();

        let outcome = push(&config, &package_dir, PublishOptions::default()).await.unwrap();
        assert_eq!(outcome.consumers.len(), 1);
        assert!(matches!(outcome.consumers[0], ConsumerPushResult::Injected { .. }));
        assert_eq!(
            std::fs::read_to_string(consumer.join("node_modules/acme/index.js")).unwrap(),
            "export const x=1;"
        );

        let link = tracker::get_link(&consumer, "acme").await.unwrap();
        assert_eq!(link.version, "1.0.0");
    }

    #[tokio::test]
    async fn push_skips_registry_entry_with_no_live_link() {
        let root = tempdir().unwrap();
        let package_dir = root.path().join("acme");
        write(&package_dir, "package.json", r#"{"name":"acme","version":"1.0.0"}"#);
        write(&package_dir, "index.js", "export const x=1;");

        let config = Config { data_dir: root.path().join("data"), ..Config::default() };
        let stale_consumer = root.path().join("stale-consumer");

        tracker::register_consumer(
            &config.consumers_registry_path(),
            &config.consumers_registry_lock_path(),
            "acme",
            &stale_consumer,
        )
        .await
        .unwrap();

        let outcome = push(&config, &package_dir, PublishOptions::default()).await.unwrap();
        assert_eq!(outcome.consumers.len(), 1);
        assert!(matches!(outcome.consumers[0], ConsumerPushResult::Skipped { .. }));
    }

    #[tokio::test]
    async fn unchanged_push_reports_skipped_and_no_fanout() {
        let root = tempdir().unwrap();
        let package_dir = root.path().join("acme");
        write(&package_dir, "package.json", r#"{"name":"acme","version":"1.0.0"}"#);
        write(&package_dir, "index.js", "export const x=1;");

        let config = Config { data_dir: root.path().join("data"), ..Config::default() };
        push(&config, &package_dir, PublishOptions::default()).await.unwrap();

        let consumer = root.path().join("consumer");
        std::fs::create_dir_all(&consumer).unwrap();
        tracker::register_consumer(
            &config.consumers_registry_path(),
            &config.consumers_registry_lock_path(),
            "acme",
            &consumer,
        )
        .await
        .unwrap();

        let outcome = push(&config, &package_dir, PublishOptions::default()).await.unwrap();
        assert!(outcome.publish.skipped);
        assert!(outcome.consumers.is_empty());
    }
}
