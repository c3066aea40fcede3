use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::policy::TruncationPolicy;

fn default_true() -> bool {
    true
}
fn default_max_workspace_files() -> usize {
    200
}
fn default_max_markdown_files() -> usize {
    20
}
fn default_max_file_chars() -> usize {
    20_000
}
fn default_max_log_lines() -> usize {
    200
}
fn default_run_command() -> String {
    "flutter run".to_string()
}

/// Gateway endpoint, credentials and context limits.
///
/// Keys use the camelCase names of the settings file, e.g. `gatewayUrl`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default)]
    pub gateway_url: String,
    #[serde(default)]
    pub gateway_token: String,
    #[serde(default = "default_true")]
    pub include_workspace_context: bool,
    #[serde(default = "default_max_workspace_files")]
    pub max_workspace_files: usize,
    #[serde(default = "default_true")]
    pub include_markdown_files: bool,
    #[serde(default = "default_max_markdown_files")]
    pub max_markdown_files: usize,
    #[serde(default = "default_max_file_chars")]
    pub max_file_chars: usize,
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,
    #[serde(default = "default_run_command")]
    pub flutter_run_command: String,
    #[serde(default)]
    pub auto_hot_reload_on_save: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_url: String::new(),
            gateway_token: String::new(),
            include_workspace_context: true,
            max_workspace_files: default_max_workspace_files(),
            include_markdown_files: true,
            max_markdown_files: default_max_markdown_files(),
            max_file_chars: default_max_file_chars(),
            max_log_lines: default_max_log_lines(),
            flutter_run_command: default_run_command(),
            auto_hot_reload_on_save: false,
        }
    }
}

impl GatewayConfig {
    /// Both the endpoint and the bearer token are set.
    pub fn has_credentials(&self) -> bool {
        !self.gateway_url.trim().is_empty() && !self.gateway_token.trim().is_empty()
    }

    /// `{gatewayUrl}/v1/responses`, tolerating a trailing slash on the base.
    pub fn responses_url(&self) -> String {
        format!("{}/v1/responses", self.gateway_url.trim().trim_end_matches('/'))
    }

    pub fn truncation_policy(&self) -> TruncationPolicy {
        TruncationPolicy::from(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where the dispatcher reads its configuration from. Called once per
/// prompt so edits apply without a restart.
pub trait ConfigSource: Send + Sync + 'static {
    fn load(&self) -> Result<GatewayConfig, ConfigError>;
}

/// Values that take precedence over the settings file (CLI flags, env).
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub gateway_url: Option<String>,
    pub gateway_token: Option<String>,
    pub include_workspace_context: Option<bool>,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut GatewayConfig) {
        if let Some(url) = &self.gateway_url {
            config.gateway_url = url.clone();
        }
        if let Some(token) = &self.gateway_token {
            config.gateway_token = token.clone();
        }
        if let Some(include) = self.include_workspace_context {
            config.include_workspace_context = include;
        }
    }
}

/// Settings file on disk, `~/.clawbridge/config.json` by default.
/// A missing file means all defaults.
pub struct FileConfigSource {
    path: PathBuf,
    overrides: ConfigOverrides,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            overrides: ConfigOverrides::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".clawbridge").join("config.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigSource {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<GatewayConfig, ConfigError> {
        let mut config = match std::fs::read_to_string(&self.path) {
            Ok(data) => serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => GatewayConfig::default(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        self.overrides.apply(&mut config);
        Ok(config)
    }
}

/// In-memory configuration that can be swapped at runtime.
#[derive(Clone, Default)]
pub struct StaticConfigSource {
    inner: Arc<RwLock<GatewayConfig>>,
}

impl StaticConfigSource {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn set(&self, config: GatewayConfig) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = config;
        }
    }
}

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> Result<GatewayConfig, ConfigError> {
        Ok(self
            .inner
            .read()
            .map(|c| c.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let c = GatewayConfig::default();
        assert!(c.include_workspace_context);
        assert!(c.include_markdown_files);
        assert_eq!(c.max_workspace_files, 200);
        assert_eq!(c.max_markdown_files, 20);
        assert_eq!(c.max_file_chars, 20_000);
        assert_eq!(c.max_log_lines, 200);
        assert_eq!(c.flutter_run_command, "flutter run");
        assert!(!c.auto_hot_reload_on_save);
        assert!(!c.has_credentials());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let c: GatewayConfig = serde_json::from_str(
            r#"{"gatewayUrl": "http://gw", "gatewayToken": "t", "maxLogLines": 5}"#,
        )
        .unwrap();
        assert_eq!(c.gateway_url, "http://gw");
        assert_eq!(c.max_log_lines, 5);
        assert_eq!(c.max_file_chars, 20_000);
        assert!(c.has_credentials());
    }

    #[test]
    fn responses_url_trims_trailing_slash() {
        let c = GatewayConfig {
            gateway_url: "http://localhost:18789/".into(),
            ..Default::default()
        };
        assert_eq!(c.responses_url(), "http://localhost:18789/v1/responses");
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let source = FileConfigSource::new(dir.path().join("nope.json"));
        assert_eq!(source.load().unwrap(), GatewayConfig::default());
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = FileConfigSource::new(&path).load().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn overrides_win_over_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"gatewayUrl": "http://file", "gatewayToken": "file"}"#).unwrap();
        let source = FileConfigSource::new(&path).with_overrides(ConfigOverrides {
            gateway_token: Some("flag".into()),
            include_workspace_context: Some(false),
            ..Default::default()
        });
        let c = source.load().unwrap();
        assert_eq!(c.gateway_url, "http://file");
        assert_eq!(c.gateway_token, "flag");
        assert!(!c.include_workspace_context);
    }

    #[test]
    fn file_is_reread_on_every_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"maxLogLines": 1}"#).unwrap();
        let source = FileConfigSource::new(&path);
        assert_eq!(source.load().unwrap().max_log_lines, 1);
        std::fs::write(&path, r#"{"maxLogLines": 2}"#).unwrap();
        assert_eq!(source.load().unwrap().max_log_lines, 2);
    }

    #[test]
    fn static_source_can_be_swapped() {
        let source = StaticConfigSource::default();
        assert!(!source.load().unwrap().has_credentials());
        source.set(GatewayConfig {
            gateway_url: "u".into(),
            gateway_token: "t".into(),
            ..Default::default()
        });
        assert!(source.load().unwrap().has_credentials());
    }
}
