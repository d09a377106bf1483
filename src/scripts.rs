//! Lifecycle script execution: `prepack`/`postpack` (publisher) and the
//! optional build command (watcher), all run the same way an npm `run`
//! command invokes package scripts — through the user's shell, with
//! `node_modules/.bin` prepended to `PATH`.

use std::path::Path;

use tracing::debug;

use crate::error::{PlunkError, Result};

/// Run `script` in `package_dir`'s shell, surfacing a non-zero exit as
/// [`PlunkError::ScriptFailed`].
pub async fn run_script(package_dir: &Path, script_name: &str, script: &str) -> Result<()> {
    debug!("running script '{script_name}': {script}");

    let mut cmd = if cfg!(windows) {
        let mut c = tokio::process::Command::new("cmd");
        c.args(["/C", script]);
        c
    } else {
        let mut c = tokio::process::Command::new("sh");
        c.args(["-c", script]);
        c
    };

    cmd.current_dir(package_dir);
    cmd.env("PATH", path_with_bin_dir(package_dir));

    let status = cmd.status().await?;

    if !status.success() {
        return Err(PlunkError::ScriptFailed {
            script: script_name.to_string(),
            code: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}

fn path_with_bin_dir(package_dir: &Path) -> String {
    let bin_dir = package_dir.join("node_modules").join(".bin");
    let current_path = std::env::var("PATH").unwrap_or_default();
    if cfg!(windows) {
        format!("{};{}", bin_dir.display(), current_path)
    } else {
        format!("{}:{}", bin_dir.display(), current_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn successful_script_returns_ok() {
        let dir = tempdir().unwrap();
        run_script(dir.path(), "noop", "exit 0").await.unwrap();
    }

    #[tokio::test]
    async fn failing_script_surfaces_script_failed() {
        let dir = tempdir().unwrap();
        let err = run_script(dir.path(), "boom", "exit 3").await.unwrap_err();
        match err {
            PlunkError::ScriptFailed { script, code } => {
                assert_eq!(script, "boom");
                assert_eq!(code, 3);
            }
            other => panic!("expected ScriptFailed, got {other:?}"),
        }
    }
}
