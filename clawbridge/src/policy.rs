use crate::config::GatewayConfig;

/// Size limits applied while building the context blob.
///
/// Built once per dispatch and handed to every loader and listing call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TruncationPolicy {
    pub max_workspace_files: usize,
    pub include_markdown_files: bool,
    pub max_markdown_files: usize,
    pub max_file_chars: usize,
    pub max_log_lines: usize,
}

impl Default for TruncationPolicy {
    fn default() -> Self {
        TruncationPolicy::from(&GatewayConfig::default())
    }
}

impl From<&GatewayConfig> for TruncationPolicy {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            max_workspace_files: config.max_workspace_files,
            include_markdown_files: config.include_markdown_files,
            max_markdown_files: config.max_markdown_files,
            max_file_chars: config.max_file_chars,
            max_log_lines: config.max_log_lines,
        }
    }
}
