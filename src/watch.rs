//! Watcher: a debounced change detector driving the push engine.
//!
//! State machine:
//! `idle -> pending (timer armed) -> building -> pushing -> cooldown -> idle`,
//! with a failed build short-circuiting straight back to `idle` and any
//! event arriving mid-cycle coalescing into the next run.

use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use tracing::{debug, info, warn};

use crate::error::{PlunkError, Result};
use crate::scripts;

/// Directories watched by default when the caller doesn't override them.
pub const DEFAULT_WATCH_DIRS: &[&str] = &["src", "lib", "dist"];

/// Directories never descended into regardless of `watch_dirs`.
const EXCLUDED_DIRS: &[&str] = &["node_modules", ".git", ".plunk"];

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub watch_dirs: Vec<String>,
    pub build_command: Option<String>,
    pub debounce: Duration,
    pub cooldown: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            watch_dirs: DEFAULT_WATCH_DIRS.iter().map(|s| s.to_string()).collect(),
            build_command: None,
            debounce: Duration::from_millis(400),
            cooldown: Duration::from_millis(500),
        }
    }
}

/// A boxed, already-pinned future returning a cycle's result.
type CycleFuture = Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>>;

/// A single push cycle, supplied by the caller (`commands::push`/`dev`) so
/// this module stays agnostic of the publish/inject plumbing.
pub type PushCycle = Box<dyn Fn() -> CycleFuture + Send + Sync>;

/// Run the watch loop until a termination signal arrives. `on_cycle` is
/// invoked once per debounced batch of filesystem events (after a
/// configured build command, if any, succeeds).
pub async fn watch(package_dir: &Path, options: WatchOptions, on_cycle: PushCycle) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();

    let mut debouncer = new_debouncer(options.debounce, move |res: DebounceEventResult| match res {
        Ok(events) if !events.is_empty() => {
            let _ = tx.send(());
        }
        Ok(_) => {}
        Err(e) => warn!("watch error: {e}"),
    })
    .map_err(|e| PlunkError::Other(format!("failed to start watcher: {e}")))?;

    let mut watched_any = false;
    for dir in &options.watch_dirs {
        if EXCLUDED_DIRS.contains(&dir.as_str()) {
            continue;
        }
        let full = package_dir.join(dir);
        if full.exists() {
            debouncer
                .watcher()
                .watch(&full, RecursiveMode::Recursive)
                .map_err(|e| PlunkError::Other(format!("failed to watch {}: {e}", full.display())))?;
            watched_any = true;
        }
    }

    if !watched_any {
        warn!(
            "none of {:?} exist under {}; watcher is armed but will never fire",
            options.watch_dirs,
            package_dir.display()
        );
    }

    info!("watching {} for changes", package_dir.display());

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                info!("received termination signal, stopping watcher");
                break;
            }
            event = rx.recv() => {
                match event {
                    None => break,
                    Some(()) => {}
                }
            }
        }

        // Coalesce any further events that arrived while this one was
        // already queued — they'll be served by the next loop iteration.
        while rx.try_recv().is_ok() {}

        run_cycle(package_dir, &options, on_cycle.as_ref()).await;
        tokio::time::sleep(options.cooldown).await;
    }

    Ok(())
}

async fn run_cycle(package_dir: &Path, options: &WatchOptions, on_cycle: &(dyn Fn() -> CycleFuture + Send + Sync)) {
    debug!("watch cycle: building");
    if let Some(cmd) = &options.build_command {
        if let Err(e) = scripts::run_script(package_dir, "build", cmd).await {
            warn!("build command failed, skipping this cycle: {e}");
            return;
        }
    }

    debug!("watch cycle: pushing");
    if let Err(e) = on_cycle().await {
        warn!("push cycle failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn failing_build_command_skips_the_cycle() {
        let dir = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let options = WatchOptions {
            build_command: Some("exit 1".to_string()),
            ..WatchOptions::default()
        };
        let on_cycle: PushCycle = Box::new(move || {
            let calls = Arc::clone(&calls_clone);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        run_cycle(dir.path(), &options, on_cycle.as_ref()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successful_build_command_runs_the_cycle() {
        let dir = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let options = WatchOptions {
            build_command: Some("exit 0".to_string()),
            ..WatchOptions::default()
        };
        let on_cycle: PushCycle = Box::new(move || {
            let calls = Arc::clone(&calls_clone);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        run_cycle(dir.path(), &options, on_cycle.as_ref()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_build_command_still_runs_the_cycle() {
        let dir = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let options = WatchOptions::default();
        let on_cycle: PushCycle = Box::new(move || {
            let calls = Arc::clone(&calls_clone);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        run_cycle(dir.path(), &options, on_cycle.as_ref()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
