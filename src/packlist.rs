//! Pack-list resolver: deterministically select the files a package
//! contributes to a publish.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;
use crate::manifest::PackageManifest;

/// Directories never walked into, regardless of `files` contents.
const HARD_EXCLUDED_DIRS: &[&str] = &["node_modules", ".git"];

/// Default-ignored paths when no `files` field narrows the publish set.
///
/// Matched by literal path-segment or full-relative-path equality — no
/// globbing; an entry like `dist/*.js` is treated as a literal (nonexistent)
/// path rather than expanded.
pub const DEFAULT_IGNORES: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "node_modules",
    ".plunk",
    ".DS_Store",
    ".idea",
    ".vscode",
    ".vs",
    "coverage",
    ".nyc_output",
    "test",
    "tests",
    "__tests__",
    ".eslintrc",
    ".eslintrc.js",
    ".eslintrc.json",
    ".prettierrc",
    ".prettierrc.js",
    ".prettierrc.json",
    "jest.config.js",
    "jest.config.ts",
    "vitest.config.js",
    "vitest.config.ts",
    ".editorconfig",
    ".npmignore",
    ".gitignore",
    ".env",
];

/// Well-known top-level files always added if present, even under an
/// explicit `files` list.
const WELL_KNOWN_FILES: &[&str] = &["README", "README.md", "LICENSE", "LICENCE", "CHANGELOG.md"];

/// Resolve the set of absolute file paths a publish of `package_dir`
/// contributes, per the parsed manifest.
pub fn resolve_pack_list(package_dir: &Path, manifest: &PackageManifest) -> Result<Vec<PathBuf>> {
    let mut selected = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let mut push = |path: PathBuf, selected: &mut Vec<PathBuf>, seen: &mut std::collections::HashSet<PathBuf>| {
        if seen.insert(path.clone()) {
            selected.push(path);
        }
    };

    // 1. the manifest itself
    let manifest_path = package_dir.join("package.json");
    if manifest_path.is_file() {
        push(manifest_path, &mut selected, &mut seen);
    }

    if !manifest.files.is_empty() {
        for entry in &manifest.files {
            let target = package_dir.join(entry);
            if !target.exists() {
                // Glob entries (e.g. `dist/*.js`) that don't literally exist
                // as a path are silently skipped rather than expanded.
                continue;
            }
            if target.is_dir() {
                for file in walk_files(&target) {
                    push(file, &mut selected, &mut seen);
                }
            } else if target.is_file() {
                push(target, &mut selected, &mut seen);
            }
        }
    } else {
        let ignore_patterns = read_npmignore(package_dir);
        for file in walk_files(package_dir) {
            let rel = file.strip_prefix(package_dir).unwrap_or(&file);
            if is_hard_excluded(rel) {
                continue;
            }
            if is_default_ignored(rel) || matches_ignore_patterns(rel, &ignore_patterns) {
                continue;
            }
            push(file, &mut selected, &mut seen);
        }
    }

    // 4. well-known top-level files, always added if present.
    for name in WELL_KNOWN_FILES {
        let path = package_dir.join(name);
        if path.is_file() {
            push(path, &mut selected, &mut seen);
        }
    }

    Ok(selected)
}

/// Walk every regular file under `root`, never descending into
/// `node_modules` or `.git` regardless of caller intent. Symlinks are
/// followed and treated as regular files on read.
fn walk_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            !HARD_EXCLUDED_DIRS.contains(&entry.file_name().to_string_lossy().as_ref())
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

fn is_hard_excluded(rel: &Path) -> bool {
    rel.components().any(|c| {
        HARD_EXCLUDED_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref())
    })
}

fn is_default_ignored(rel: &Path) -> bool {
    let rel_str = rel.to_string_lossy().replace('\\', "/");
    if DEFAULT_IGNORES.iter().any(|pat| *pat == rel_str) {
        return true;
    }
    rel.components()
        .any(|c| DEFAULT_IGNORES.contains(&c.as_os_str().to_string_lossy().as_ref()))
}

/// Read `.npmignore` sibling file: one token per non-comment, non-blank
/// line.
fn read_npmignore(package_dir: &Path) -> Vec<String> {
    let path = package_dir.join(".npmignore");
    let Ok(content) = std::fs::read_to_string(&path) else {
        return Vec::new();
    };
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// A relative path matches an ignore pattern if any of its segments equal
/// the pattern, or the whole relative path (with `/` separators) does.
fn matches_ignore_patterns(rel: &Path, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let rel_str = rel.to_string_lossy().replace('\\', "/");
    patterns.iter().any(|pattern| {
        pattern == &rel_str
            || rel
                .components()
                .any(|c| c.as_os_str().to_string_lossy() == *pattern)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manifest(files: &[&str]) -> PackageManifest {
        PackageManifest {
            name: Some("acme".into()),
            version: Some("1.0.0".into()),
            files: files.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn files_field_includes_directory_recursively() {
        let dir = tempdir().unwrap();
        write(dir.path(), "package.json", r#"{"name":"acme","version":"1.0.0"}"#);
        write(dir.path(), "dist/index.js", "export const x=1;");
        write(dir.path(), "dist/nested/util.js", "export const y=2;");
        write(dir.path(), "src/index.ts", "ignored");

        let list = resolve_pack_list(dir.path(), &manifest(&["dist"])).unwrap();
        let rels: Vec<_> = list
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();

        assert!(rels.contains(&"package.json".to_string()));
        assert!(rels.contains(&"dist/index.js".to_string()));
        assert!(rels.contains(&"dist/nested/util.js".to_string()));
        assert!(!rels.contains(&"src/index.ts".to_string()));
    }

    #[test]
    fn missing_files_entry_is_silently_skipped() {
        let dir = tempdir().unwrap();
        write(dir.path(), "package.json", r#"{"name":"acme","version":"1.0.0"}"#);

        let list = resolve_pack_list(dir.path(), &manifest(&["does-not-exist"])).unwrap();
        assert_eq!(list.len(), 1); // just package.json
    }

    #[test]
    fn glob_entry_that_does_not_exist_literally_is_skipped() {
        let dir = tempdir().unwrap();
        write(dir.path(), "package.json", r#"{"name":"acme","version":"1.0.0"}"#);
        write(dir.path(), "dist/index.js", "export const x=1;");

        // "dist/*.js" isn't a literal path, so it's treated as nonexistent.
        let list = resolve_pack_list(dir.path(), &manifest(&["dist/*.js"])).unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn default_scan_excludes_node_modules_and_git() {
        let dir = tempdir().unwrap();
        write(dir.path(), "package.json", r#"{"name":"acme","version":"1.0.0"}"#);
        write(dir.path(), "index.js", "export const x=1;");
        write(dir.path(), "node_modules/dep/index.js", "nope");
        write(dir.path(), ".git/HEAD", "nope");

        let list = resolve_pack_list(dir.path(), &manifest(&[])).unwrap();
        let rels: Vec<_> = list
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();

        assert!(rels.contains(&"index.js".to_string()));
        assert!(!rels.iter().any(|r| r.starts_with("node_modules")));
        assert!(!rels.iter().any(|r| r.starts_with(".git")));
    }

    #[test]
    fn npmignore_patterns_are_honored() {
        let dir = tempdir().unwrap();
        write(dir.path(), "package.json", r#"{"name":"acme","version":"1.0.0"}"#);
        write(dir.path(), "index.js", "export const x=1;");
        write(dir.path(), "scratch.tmp", "nope");
        write(dir.path(), ".npmignore", "# comment\nscratch.tmp\n");

        let list = resolve_pack_list(dir.path(), &manifest(&[])).unwrap();
        let rels: Vec<_> = list
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();

        assert!(rels.contains(&"index.js".to_string()));
        assert!(!rels.contains(&"scratch.tmp".to_string()));
    }

    #[test]
    fn well_known_files_added_even_under_explicit_files_list() {
        let dir = tempdir().unwrap();
        write(dir.path(), "package.json", r#"{"name":"acme","version":"1.0.0"}"#);
        write(dir.path(), "dist/index.js", "export const x=1;");
        write(dir.path(), "README.md", "# acme");

        let list = resolve_pack_list(dir.path(), &manifest(&["dist"])).unwrap();
        let rels: Vec<_> = list
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();

        assert!(rels.contains(&"README.md".to_string()));
    }

    #[test]
    fn deduplicates_preserving_insertion_order() {
        let dir = tempdir().unwrap();
        write(dir.path(), "package.json", r#"{"name":"acme","version":"1.0.0"}"#);
        write(dir.path(), "README.md", "# acme");

        // README.md both matches the default scan and the well-known-files
        // pass; it must appear exactly once.
        let list = resolve_pack_list(dir.path(), &manifest(&[])).unwrap();
        let readme_count = list
            .iter()
            .filter(|p| p.ends_with("README.md"))
            .count();
        assert_eq!(readme_count, 1);
    }
}
