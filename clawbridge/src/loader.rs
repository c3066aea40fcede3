use std::path::Path;

/// Text of one file as it will appear in the context blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedText {
    /// The whole file fit in the budget.
    Full(String),
    /// The first `max_chars` characters; `omitted` more were cut.
    Truncated { text: String, omitted: usize },
    /// The file could not be read as UTF-8 text.
    Unreadable(String),
}

impl LoadedText {
    /// Render with the truncation or failure marker appended.
    pub fn render(&self) -> String {
        match self {
            LoadedText::Full(text) => text.clone(),
            LoadedText::Truncated { text, omitted } => {
                format!("{text}\n[truncated: {omitted} chars omitted]")
            }
            LoadedText::Unreadable(reason) => format!("[unreadable: {reason}]"),
        }
    }

    pub fn is_unreadable(&self) -> bool {
        matches!(self, LoadedText::Unreadable(_))
    }
}

/// Read `path` as text, keeping at most `max_chars` characters.
///
/// Never fails: read errors come back as [`LoadedText::Unreadable`] so that
/// context assembly can carry on with the remaining files.
pub fn load(path: &Path, max_chars: usize) -> LoadedText {
    let content = match std::fs::read(path) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(_) => return LoadedText::Unreadable("not valid UTF-8".into()),
        },
        Err(e) => return LoadedText::Unreadable(e.to_string()),
    };
    truncate_chars(content, max_chars)
}

pub(crate) fn truncate_chars(content: String, max_chars: usize) -> LoadedText {
    match content.char_indices().nth(max_chars) {
        None => LoadedText::Full(content),
        Some((cut, _)) => {
            let omitted = content[cut..].chars().count();
            let mut text = content;
            text.truncate(cut);
            LoadedText::Truncated { text, omitted }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn small_file_is_returned_whole() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();
        assert_eq!(load(&path, 100), LoadedText::Full("hello".into()));
    }

    #[test]
    fn exact_budget_is_not_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "12345").unwrap();
        assert_eq!(load(&path, 5).render(), "12345");
    }

    #[test]
    fn long_file_keeps_prefix_and_reports_omitted_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "abcdefghij").unwrap();
        let loaded = load(&path, 4);
        assert_eq!(
            loaded,
            LoadedText::Truncated {
                text: "abcd".into(),
                omitted: 6
            }
        );
        let rendered = loaded.render();
        assert!(rendered.starts_with("abcd\n"));
        assert!(rendered.contains("6 chars omitted"));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let loaded = truncate_chars("héllo wörld".to_string(), 3);
        match loaded {
            LoadedText::Truncated { text, omitted } => {
                assert_eq!(text, "hél");
                assert_eq!(text.chars().count(), 3);
                assert_eq!(omitted, 8);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_yields_marker() {
        let loaded = load(Path::new("/nonexistent/path/to/file.txt"), 10);
        assert!(loaded.is_unreadable());
        assert!(loaded.render().starts_with("[unreadable:"));
    }

    #[test]
    fn binary_file_yields_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x81]).unwrap();
        let loaded = load(&path, 10);
        assert_eq!(loaded, LoadedText::Unreadable("not valid UTF-8".into()));
    }
}
