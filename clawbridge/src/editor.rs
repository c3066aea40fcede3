use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Inclusive, 1-based line range selected in the active file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start_line: usize,
    pub end_line: usize,
}

impl Selection {
    /// The selected lines of `content`, or an empty string when the range
    /// lies past the end of the file or is inverted.
    pub fn extract(&self, content: &str) -> String {
        if self.end_line < self.start_line {
            return String::new();
        }
        content
            .lines()
            .skip(self.start_line.saturating_sub(1))
            .take((self.end_line - self.start_line).saturating_add(1))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl FromStr for Selection {
    type Err = String;

    /// Accepts `N` or `N-M` with `1 <= N <= M`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = match s.split_once('-') {
            Some((a, b)) => (a.trim(), b.trim()),
            None => (s.trim(), s.trim()),
        };
        let start: usize = a.parse().map_err(|_| format!("invalid line number: {a}"))?;
        let end: usize = b.parse().map_err(|_| format!("invalid line number: {b}"))?;
        if start == 0 || end < start {
            return Err(format!("invalid line range: {s}"));
        }
        Ok(Self {
            start_line: start,
            end_line: end,
        })
    }
}

/// The file the user is currently looking at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEditor {
    pub path: PathBuf,
    pub selection: Option<Selection>,
}

/// Workspace folders plus the active editor, as known to the host.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceState {
    pub folders: Vec<PathBuf>,
    pub active: Option<ActiveEditor>,
}

impl WorkspaceState {
    pub fn new(folders: Vec<PathBuf>) -> Self {
        Self {
            folders,
            active: None,
        }
    }

    /// First workspace folder; relative paths and listings hang off it.
    pub fn primary_root(&self) -> Option<&Path> {
        self.folders.first().map(PathBuf::as_path)
    }

    pub fn focus(&mut self, path: PathBuf, selection: Option<Selection>) {
        self.active = Some(ActiveEditor { path, selection });
    }

    pub fn unfocus(&mut self) {
        self.active = None;
    }
}
