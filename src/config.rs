//! Configuration for plunk.
//!
//! Layered config, the way an npm-compatible CLI loads it: defaults,
//! overridden by environment, overridden by CLI flags at the call site
//! (see `commands::CommandContext::new`). There is no `.npmrc`-style file
//! layer here — the whole surface is `PLUNK_HOME` plus a couple of
//! process-wide flags.

use std::path::PathBuf;

/// Process-wide configuration, loaded once at startup and passed by
/// reference from then on; no mutable global state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the per-user data directory (store + consumers registry).
    /// Overridable via `PLUNK_HOME`.
    pub data_dir: PathBuf,

    /// Raise log verbosity. Set by `--verbose` or `VERBOSE=1`.
    pub verbose: bool,

    /// Suppress human-readable narration.
    pub quiet: bool,

    /// Machine-readable output on stdout instead of prose.
    pub json_output: bool,

    /// Report intended actions without performing them.
    pub dry_run: bool,

    /// Bounded fan-out limit for concurrent file operations (hashing,
    /// listing, staleness checks).
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            verbose: std::env::var("VERBOSE").is_ok_and(|v| v == "1" || v == "true"),
            quiet: false,
            json_output: false,
            dry_run: false,
            concurrency: 8,
        }
    }
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Self {
        let mut config = Config::default();

        if let Ok(home) = std::env::var("PLUNK_HOME") {
            if !home.is_empty() {
                config.data_dir = PathBuf::from(home);
            }
        }

        config
    }

    /// The store root: `<data_dir>/store`.
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }

    /// The global consumers registry file: `<data_dir>/consumers.json`.
    pub fn consumers_registry_path(&self) -> PathBuf {
        self.data_dir.join("consumers.json")
    }

    /// The lock file backing mutations to the consumers registry.
    pub fn consumers_registry_lock_path(&self) -> PathBuf {
        self.data_dir.join("consumers.json.lock")
    }
}

/// Default per-user data directory: `dirs::data_local_dir()/plunk`.
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("plunk")
}
