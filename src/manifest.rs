//! `package.json` parsing, scoped to the fields the publisher, pack-list
//! resolver, and injector actually consult.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PlunkError, Result};

/// A parsed `package.json`.
///
/// Fields this system doesn't model are preserved via `extra` so writing a
/// manifest back out (not something the core does today, but kept for
/// forward compatibility) never silently drops user data.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub name: Option<String>,
    pub version: Option<String>,

    #[serde(default)]
    pub private: Option<bool>,

    /// Explicit file/directory list to publish; absent means "collect
    /// everything except the default ignores".
    #[serde(default)]
    pub files: Vec<String>,

    #[serde(default)]
    pub scripts: BTreeMap<String, String>,

    /// Binary executables; string form is a single unnamed bin named after
    /// the package, map form is `command -> relative path`.
    pub bin: Option<BinField>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The `bin` field can be a bare string or a map of command names to paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinField {
    Single(String),
    Multiple(BTreeMap<String, String>),
}

impl PackageManifest {
    /// Read and parse `package.json` from a package directory.
    pub fn read_from_dir(package_dir: &Path) -> Result<Self> {
        let path = package_dir.join("package.json");
        Self::read(&path)
    }

    /// Read and parse a manifest at an exact path.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PlunkError::InvalidManifest {
                    path: path.to_path_buf(),
                    reason: "package.json not found".into(),
                }
            } else {
                PlunkError::Io(e)
            }
        })?;
        let manifest: PackageManifest = serde_json::from_str(&content).map_err(|e| {
            PlunkError::InvalidManifest {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        manifest.validate(path)?;
        Ok(manifest)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.name.as_deref().unwrap_or("").is_empty() {
            return Err(PlunkError::InvalidManifest {
                path: path.to_path_buf(),
                reason: "missing required field 'name'".into(),
            });
        }
        if self.version.as_deref().unwrap_or("").is_empty() {
            return Err(PlunkError::InvalidManifest {
                path: path.to_path_buf(),
                reason: "missing required field 'version'".into(),
            });
        }
        Ok(())
    }

    /// `true` if the manifest is marked private.
    pub fn is_private(&self) -> bool {
        self.private.unwrap_or(false)
    }

    /// The package identity, assuming `validate` has already passed.
    pub fn identity(&self) -> (String, String) {
        (
            self.name.clone().unwrap_or_default(),
            self.version.clone().unwrap_or_default(),
        )
    }

    /// Bin entries as `(command, relative_path)` pairs.
    pub fn bin_entries(&self) -> Vec<(String, String)> {
        match &self.bin {
            None => Vec::new(),
            Some(BinField::Single(path)) => self
                .name
                .as_ref()
                .map(|name| {
                    let command = name.rsplit('/').next().unwrap_or(name).to_string();
                    vec![(command, path.clone())]
                })
                .unwrap_or_default(),
            Some(BinField::Multiple(map)) => {
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
        }
    }

    pub fn get_script(&self, name: &str) -> Option<&String> {
        self.scripts.get(name)
    }
}
