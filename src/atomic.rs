//! Shared atomic-write helper: write a temp sibling, fsync, rename over the
//! target. Used by the store (entry metadata) and the tracker (consumer
//! state and the consumers registry) — anywhere a reader must never observe
//! a partially-written file.

use std::path::Path;

use serde::Serialize;

use crate::error::Result;

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp_path = sibling_tmp_path(path);
    let bytes = serde_json::to_vec_pretty(value)?;

    {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        use tokio::io::AsyncWriteExt;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
    }
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

fn sibling_tmp_path(path: &Path) -> std::path::PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp-{}", file_name, std::process::id()))
}
