use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::editor::ActiveEditor;
use crate::loader::{self, LoadedText};
use crate::log_buffer::SharedLogBuffer;
use crate::policy::TruncationPolicy;
use crate::workspace;

/// Everything the context blob is built from, captured at dispatch time.
///
/// The log buffer is shared rather than copied: its tail is read when the
/// run-log section is written, so lines appended meanwhile are included.
#[derive(Clone)]
pub struct ContextSources {
    pub folders: Vec<PathBuf>,
    pub active: Option<ActiveEditor>,
    pub attachments: Vec<PathBuf>,
    pub log: SharedLogBuffer,
}

/// Builds the workspace description sent alongside a prompt.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContextAssembler {
    policy: TruncationPolicy,
}

impl ContextAssembler {
    pub fn new(policy: TruncationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TruncationPolicy {
        &self.policy
    }

    /// Assemble the blob. Sections always appear in the same order and a
    /// missing input yields a placeholder, never an error.
    pub fn assemble(&self, sources: &ContextSources) -> String {
        let root = sources.folders.first().map(PathBuf::as_path);
        let mut out = String::new();

        section(&mut out, "Workspace folders", &self.folders(&sources.folders));
        section(&mut out, "Active file", &self.active_file(sources.active.as_ref()));
        section(&mut out, "Attached files", &self.attached(&sources.attachments));
        section(&mut out, "Markdown files", &self.markdown(&sources.folders, root));
        section(&mut out, "Workspace files", &self.listing(&sources.folders, root));
        section(
            &mut out,
            &format!("Run log (last {} lines)", self.policy.max_log_lines),
            &self.log_tail(&sources.log),
        );

        out.truncate(out.trim_end().len());
        out
    }

    /// [`assemble`](Self::assemble) on the blocking pool.
    pub async fn assemble_async(self, sources: ContextSources) -> String {
        tokio::task::spawn_blocking(move || self.assemble(&sources))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("context assembly task failed: {e}");
                format!("(workspace context unavailable: {e})")
            })
    }

    fn folders(&self, folders: &[PathBuf]) -> String {
        if folders.is_empty() {
            return "(none)".into();
        }
        folders
            .iter()
            .map(|f| f.display().to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn active_file(&self, active: Option<&ActiveEditor>) -> String {
        let Some(editor) = active else {
            return "(no active editor)".into();
        };
        let mut body = format!("Path: {}\n", editor.path.display());
        match loader::load(&editor.path, usize::MAX) {
            LoadedText::Full(full) => {
                if let Some(sel) = editor.selection {
                    let text = sel.extract(&full);
                    if !text.is_empty() {
                        let _ = write!(
                            body,
                            "Selection (lines {}-{}):\n{}\n",
                            sel.start_line, sel.end_line, text
                        );
                    }
                }
                let content = loader::truncate_chars(full, self.policy.max_file_chars);
                let _ = write!(body, "Content:\n{}", content.render());
            }
            other => {
                let _ = write!(body, "Content:\n{}", other.render());
            }
        }
        body
    }

    fn attached(&self, paths: &[PathBuf]) -> String {
        if paths.is_empty() {
            return "(none)".into();
        }
        paths
            .iter()
            .map(|p| file_block(&p.display().to_string(), p, self.policy.max_file_chars))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn markdown(&self, folders: &[PathBuf], root: Option<&Path>) -> String {
        if !self.policy.include_markdown_files {
            return "(disabled)".into();
        }
        let found = workspace::markdown_files(folders, self.policy.max_markdown_files);
        if found.paths.is_empty() {
            return "(none found)".into();
        }
        found
            .paths
            .iter()
            .map(|p| {
                file_block(
                    &workspace::display_path(p, root),
                    p,
                    self.policy.max_file_chars,
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn listing(&self, folders: &[PathBuf], root: Option<&Path>) -> String {
        let found = workspace::workspace_files(folders, self.policy.max_workspace_files);
        if found.paths.is_empty() {
            return "(none found)".into();
        }
        let mut lines: Vec<String> = found
            .paths
            .iter()
            .map(|p| workspace::display_path(p, root))
            .collect();
        if found.capped {
            lines.push(format!(
                "... (listing capped at {} files)",
                self.policy.max_workspace_files
            ));
        }
        lines.join("\n")
    }

    fn log_tail(&self, log: &SharedLogBuffer) -> String {
        let tail = match log.lock() {
            Ok(buf) => buf.tail(self.policy.max_log_lines),
            Err(poisoned) => poisoned.into_inner().tail(self.policy.max_log_lines),
        };
        if tail.is_empty() {
            "(empty)".into()
        } else {
            tail
        }
    }
}

fn section(out: &mut String, title: &str, body: &str) {
    let _ = write!(out, "## {title}\n{body}\n\n");
}

fn file_block(label: &str, path: &Path, max_chars: usize) -> String {
    format!("### {label}\n{}", loader::load(path, max_chars).render())
}
