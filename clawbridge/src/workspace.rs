use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Build output and dependency directories never worth sending.
pub const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "build",
    ".dart_tool",
    "dist",
    "out",
    "target",
    ".idea",
    ".gradle",
    "Pods",
    ".next",
    "coverage",
];

/// Files found under the workspace roots, in walk order, capped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub paths: Vec<PathBuf>,
    /// More files matched than the cap allowed.
    pub capped: bool,
}

fn is_excluded(entry: &ignore::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_some_and(|t| t.is_dir())
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
}

/// Walk every root (respecting .gitignore and [`EXCLUDED_DIRS`]) and collect
/// up to `max` files accepted by `matcher`. Paths are absolute.
pub fn discover(roots: &[PathBuf], matcher: Option<&GlobSet>, max: usize) -> Discovery {
    let mut found = Discovery::default();
    if max == 0 {
        return found;
    }

    for root in roots {
        if !root.is_dir() {
            tracing::debug!("skipping workspace root {}: not a directory", root.display());
            continue;
        }
        let walker = ignore::WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(true)
            .require_git(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(|e| !is_excluded(e))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            if let Some(m) = matcher {
                let rel = path.strip_prefix(root).unwrap_or(path);
                if !m.is_match(rel) {
                    continue;
                }
            }
            if found.paths.len() >= max {
                found.capped = true;
                return found;
            }
            found.paths.push(path.to_path_buf());
        }
    }
    found
}

/// Any file in the workspace.
pub fn workspace_files(roots: &[PathBuf], max: usize) -> Discovery {
    discover(roots, None, max)
}

/// Markdown files (`*.md`, any case) in the workspace.
pub fn markdown_files(roots: &[PathBuf], max: usize) -> Discovery {
    match markdown_matcher() {
        Ok(m) => discover(roots, Some(&m), max),
        Err(e) => {
            tracing::warn!("failed to build markdown matcher: {e}");
            Discovery::default()
        }
    }
}

fn markdown_matcher() -> Result<GlobSet, globset::Error> {
    let glob = GlobBuilder::new("**/*.md")
        .case_insensitive(true)
        .literal_separator(false)
        .build()?;
    GlobSetBuilder::new().add(glob).build()
}

/// `path` relative to `root` when it lives underneath it.
pub fn display_path(path: &Path, root: Option<&Path>) -> String {
    root.and_then(|r| path.strip_prefix(r).ok())
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("lib/src")).unwrap();
        std::fs::create_dir_all(root.join("build/app")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::create_dir_all(root.join(".dart_tool")).unwrap();
        std::fs::write(root.join("README.md"), "# readme").unwrap();
        std::fs::write(root.join("lib/main.dart"), "void main() {}").unwrap();
        std::fs::write(root.join("lib/src/NOTES.MD"), "notes").unwrap();
        std::fs::write(root.join("build/app/out.txt"), "").unwrap();
        std::fs::write(root.join("build/app/GEN.md"), "").unwrap();
        std::fs::write(root.join("node_modules/pkg/index.js"), "").unwrap();
        std::fs::write(root.join(".dart_tool/cache"), "").unwrap();
        dir
    }

    fn rel(d: &Discovery, root: &Path) -> Vec<String> {
        d.paths
            .iter()
            .map(|p| display_path(p, Some(root)))
            .collect()
    }

    #[test]
    fn listing_skips_excluded_dirs() {
        let dir = tree();
        let d = workspace_files(&[dir.path().to_path_buf()], 100);
        let names = rel(&d, dir.path());
        assert!(names.contains(&"README.md".to_string()));
        assert!(names.contains(&"lib/main.dart".to_string()));
        assert!(!names.iter().any(|n| n.starts_with("build")));
        assert!(!names.iter().any(|n| n.starts_with("node_modules")));
        assert!(!names.iter().any(|n| n.starts_with(".dart_tool")));
        assert!(!d.capped);
    }

    #[test]
    fn listing_respects_cap() {
        let dir = tree();
        let d = workspace_files(&[dir.path().to_path_buf()], 2);
        assert_eq!(d.paths.len(), 2);
        assert!(d.capped);
    }

    #[test]
    fn zero_cap_finds_nothing() {
        let dir = tree();
        let d = workspace_files(&[dir.path().to_path_buf()], 0);
        assert!(d.paths.is_empty());
    }

    #[test]
    fn markdown_matches_case_insensitively() {
        let dir = tree();
        let d = markdown_files(&[dir.path().to_path_buf()], 10);
        let names = rel(&d, dir.path());
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"README.md".to_string()));
        assert!(names.contains(&"lib/src/NOTES.MD".to_string()));
    }

    #[test]
    fn missing_root_is_skipped() {
        let d = workspace_files(&[PathBuf::from("/nonexistent/workspace")], 10);
        assert_eq!(d, Discovery::default());
    }

    #[test]
    fn display_path_outside_root_stays_absolute() {
        let p = Path::new("/elsewhere/file.txt");
        assert_eq!(display_path(p, Some(Path::new("/ws"))), "/elsewhere/file.txt");
        assert_eq!(display_path(Path::new("/ws/a/b"), Some(Path::new("/ws"))), "a/b");
    }
}
