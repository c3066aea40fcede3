use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Files the user pinned into every prompt's context.
#[derive(Debug, Clone, Default)]
pub struct AttachedFileSet {
    paths: BTreeSet<PathBuf>,
}

impl AttachedFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `path`, resolving it against `base` when relative. Returns
    /// `false` if it was already attached.
    pub fn add(&mut self, path: &Path, base: Option<&Path>) -> bool {
        self.paths.insert(absolutize(path, base))
    }

    pub fn remove(&mut self, path: &Path, base: Option<&Path>) -> bool {
        self.paths.remove(&absolutize(path, base))
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Make `path` absolute without touching the filesystem, so files that do
/// not exist yet can still be attached.
pub(crate) fn absolutize(path: &Path, base: Option<&Path>) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let base = base
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("/"));
    base.join(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let mut set = AttachedFileSet::new();
        assert!(set.add(Path::new("/ws/a.dart"), None));
        assert!(!set.add(Path::new("/ws/a.dart"), None));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let mut set = AttachedFileSet::new();
        set.add(Path::new("lib/main.dart"), Some(Path::new("/ws")));
        assert!(set.contains(Path::new("/ws/lib/main.dart")));
        assert!(!set.add(Path::new("/ws/lib/main.dart"), None));
    }

    #[test]
    fn remove_and_clear() {
        let mut set = AttachedFileSet::new();
        set.add(Path::new("/a"), None);
        set.add(Path::new("/b"), None);
        assert!(set.remove(Path::new("/a"), None));
        assert!(!set.remove(Path::new("/a"), None));
        set.clear();
        assert!(set.is_empty());
    }
}
