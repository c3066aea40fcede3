use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;

use crate::attachments::{AttachedFileSet, absolutize};
use crate::config::{ConfigSource, GatewayConfig};
use crate::context::{ContextAssembler, ContextSources};
use crate::dispatch::{DispatchOutcome, PromptDispatcher};
use crate::editor::{Selection, WorkspaceState};
use crate::loader::{self, LoadedText};
use crate::log_buffer::{DEFAULT_CAPACITY, LogBuffer, SharedLogBuffer};
use crate::process::{ProcessController, ProcessError};
use crate::{DisplaySender, UiMessage, post};

/// The host-facing surface: every user action enters here.
///
/// Owns the workspace view, the attached files, the run log, the run
/// process and the dispatcher. All user-visible results go to the display
/// surface; methods return values only so callers can wait on them.
pub struct Bridge {
    workspace: Mutex<WorkspaceState>,
    attachments: Mutex<AttachedFileSet>,
    log: SharedLogBuffer,
    process: ProcessController,
    dispatcher: PromptDispatcher,
    config: Arc<dyn ConfigSource>,
    display: DisplaySender,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl Bridge {
    pub fn new(
        folders: Vec<PathBuf>,
        config: Arc<dyn ConfigSource>,
        display: DisplaySender,
    ) -> Self {
        let log = LogBuffer::shared(DEFAULT_CAPACITY);
        let mut process = ProcessController::new(log.clone(), display.clone());
        if let Some(root) = folders.first() {
            process = process.with_cwd(root);
        }
        Self {
            workspace: Mutex::new(WorkspaceState::new(folders)),
            attachments: Mutex::new(AttachedFileSet::new()),
            log,
            process,
            dispatcher: PromptDispatcher::new(config.clone(), display.clone()),
            config,
            display,
        }
    }

    /// Run commands through `shell_path` instead of `$SHELL`.
    pub fn with_shell(mut self, shell_path: impl Into<String>) -> Self {
        self.process = self.process.with_shell(shell_path);
        self
    }

    pub fn process(&self) -> &ProcessController {
        &self.process
    }

    pub fn log(&self) -> &SharedLogBuffer {
        &self.log
    }

    pub fn workspace(&self) -> WorkspaceState {
        lock(&self.workspace).clone()
    }

    pub fn attachments(&self) -> Vec<PathBuf> {
        lock(&self.attachments).iter().cloned().collect()
    }

    fn root(&self) -> Option<PathBuf> {
        lock(&self.workspace).primary_root().map(Path::to_path_buf)
    }

    fn sources(&self) -> ContextSources {
        let ws = self.workspace();
        ContextSources {
            folders: ws.folders,
            active: ws.active,
            attachments: self.attachments(),
            log: self.log.clone(),
        }
    }

    fn load_config(&self) -> GatewayConfig {
        self.config.load().unwrap_or_else(|e| {
            tracing::warn!("falling back to default settings: {e}");
            post(&self.display, format!("Invalid settings, using defaults: {e}"));
            GatewayConfig::default()
        })
    }

    /// Route a message from the display surface. Only `send` is acted on.
    pub fn handle(&self, msg: UiMessage) -> Option<JoinHandle<DispatchOutcome>> {
        match msg {
            UiMessage::Send { text } => Some(self.send_prompt(text)),
            UiMessage::Log { text } => {
                tracing::debug!("ignoring inbound log message: {text}");
                None
            }
        }
    }

    /// Dispatch `prompt` with a snapshot of the current workspace state.
    pub fn send_prompt(&self, prompt: impl Into<String>) -> JoinHandle<DispatchOutcome> {
        self.dispatcher.spawn_send(prompt.into(), Some(self.sources()))
    }

    /// Dispatch the active editor's selected text as the prompt. Nothing is
    /// sent when there is no selection or it is empty.
    pub fn send_selection(&self) -> Option<JoinHandle<DispatchOutcome>> {
        let active = lock(&self.workspace).active.clone();
        let text = active.and_then(|editor| {
            let sel = editor.selection?;
            match loader::load(&editor.path, usize::MAX) {
                LoadedText::Full(content) => Some(sel.extract(&content)),
                other => {
                    post(&self.display, other.render());
                    None
                }
            }
        });
        match text {
            Some(text) if !text.trim().is_empty() => Some(self.send_prompt(text)),
            _ => {
                post(&self.display, "No selection to send.");
                None
            }
        }
    }

    /// Attach a file; relative paths resolve against the primary root.
    pub fn attach(&self, path: &Path) -> bool {
        let root = self.root();
        let abs = absolutize(path, root.as_deref());
        let added = lock(&self.attachments).add(&abs, None);
        if added {
            post(&self.display, format!("Attached {}", abs.display()));
        } else {
            post(&self.display, format!("Already attached: {}", abs.display()));
        }
        added
    }

    pub fn detach(&self, path: &Path) -> bool {
        let root = self.root();
        let abs = absolutize(path, root.as_deref());
        let removed = lock(&self.attachments).remove(&abs, None);
        if removed {
            post(&self.display, format!("Detached {}", abs.display()));
        } else {
            post(&self.display, format!("Not attached: {}", abs.display()));
        }
        removed
    }

    pub fn clear_attachments(&self) {
        lock(&self.attachments).clear();
        post(&self.display, "Cleared attached files.");
    }

    /// Make `path` the active editor, optionally with a selected range.
    pub fn focus(&self, path: &Path, selection: Option<Selection>) {
        let mut ws = lock(&self.workspace);
        let abs = absolutize(path, ws.primary_root());
        ws.focus(abs, selection);
    }

    pub fn unfocus(&self) {
        lock(&self.workspace).unfocus();
    }

    /// Start a run session with `command`, or the configured run command.
    pub fn start_run(&self, command: Option<&str>) -> Result<u32, ProcessError> {
        let command = match command.map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => c.to_string(),
            None => self.load_config().flutter_run_command,
        };
        self.process.start(&command)
    }

    pub async fn hot_reload(&self) -> Result<(), ProcessError> {
        self.process.hot_reload().await
    }

    pub async fn hot_restart(&self) -> Result<(), ProcessError> {
        self.process.hot_restart().await
    }

    pub async fn stop_run(&self) -> Result<(), ProcessError> {
        self.process.stop().await
    }

    /// Notify that a file was saved. Hot-reloads when enabled, a session
    /// is running and the file is Dart source. Returns whether a reload
    /// was sent.
    pub async fn file_saved(&self, path: &Path) -> bool {
        let is_dart = path.extension().is_some_and(|e| e == "dart");
        if !is_dart || !self.process.is_running() {
            return false;
        }
        if !self.load_config().auto_hot_reload_on_save {
            return false;
        }
        tracing::info!(path = %path.display(), "hot reload on save");
        self.process.hot_reload().await.is_ok()
    }

    /// The context blob a prompt sent now would carry.
    pub async fn context_preview(&self) -> String {
        let policy = self.load_config().truncation_policy();
        ContextAssembler::new(policy)
            .assemble_async(self.sources())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfigSource;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    fn bridge_with(
        folders: Vec<PathBuf>,
        config: GatewayConfig,
    ) -> (Bridge, mpsc::UnboundedReceiver<UiMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Arc::new(StaticConfigSource::new(config));
        (Bridge::new(folders, source, tx).with_shell("sh"), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<UiMessage>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(m) = rx.try_recv() {
            out.push(m.text().to_string());
        }
        out
    }

    async fn wait_for_log(bridge: &Bridge, needle: &str) -> bool {
        let deadline = tokio::time::Instant::now() + WAIT;
        while tokio::time::Instant::now() < deadline {
            if bridge.log().lock().unwrap().tail(100).contains(needle) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn send_without_credentials_reports_and_stops() {
        let (bridge, mut rx) = bridge_with(vec![], GatewayConfig::default());
        let handle = bridge
            .handle(UiMessage::Send {
                text: "hello".into(),
            })
            .unwrap();
        assert!(matches!(
            handle.await.unwrap(),
            DispatchOutcome::ConfigError(_)
        ));
        assert_eq!(
            drain(&mut rx),
            vec![
                "You: hello".to_string(),
                "Missing gatewayUrl or gatewayToken in settings.".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn inbound_log_messages_are_ignored() {
        let (bridge, _rx) = bridge_with(vec![], GatewayConfig::default());
        assert!(bridge.handle(UiMessage::log("x")).is_none());
    }

    #[tokio::test]
    async fn attachments_resolve_against_root_and_reach_context() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "pinned").unwrap();
        let (bridge, mut rx) = bridge_with(vec![dir.path().to_path_buf()], GatewayConfig::default());

        assert!(bridge.attach(Path::new("notes.txt")));
        assert!(!bridge.attach(&dir.path().join("notes.txt")));
        assert_eq!(bridge.attachments(), vec![dir.path().join("notes.txt")]);
        assert!(drain(&mut rx)[1].starts_with("Already attached:"));

        let preview = bridge.context_preview().await;
        assert!(preview.contains("notes.txt\npinned"));

        assert!(bridge.detach(Path::new("notes.txt")));
        bridge.attach(Path::new("notes.txt"));
        bridge.clear_attachments();
        assert!(bridge.attachments().is_empty());
    }

    #[tokio::test]
    async fn selection_is_sent_as_prompt() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.dart"), "one\ntwo\nthree").unwrap();
        let (bridge, mut rx) = bridge_with(vec![dir.path().to_path_buf()], GatewayConfig::default());

        bridge.focus(Path::new("main.dart"), Some("2".parse().unwrap()));
        bridge.send_selection().unwrap().await.unwrap();
        assert_eq!(drain(&mut rx)[0], "You: two");
    }

    #[tokio::test]
    async fn missing_selection_sends_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.dart"), "one").unwrap();
        let (bridge, mut rx) = bridge_with(vec![dir.path().to_path_buf()], GatewayConfig::default());

        assert!(bridge.send_selection().is_none());
        bridge.focus(Path::new("main.dart"), None);
        assert!(bridge.send_selection().is_none());
        bridge.focus(Path::new("main.dart"), Some("5-6".parse().unwrap()));
        assert!(bridge.send_selection().is_none());
        assert!(drain(&mut rx).iter().all(|m| m == "No selection to send."));
    }

    #[tokio::test]
    async fn start_run_falls_back_to_configured_command() {
        let config = GatewayConfig {
            flutter_run_command: "echo configured".into(),
            ..Default::default()
        };
        let (bridge, _rx) = bridge_with(vec![], config);
        bridge.start_run(None).unwrap();
        assert!(bridge.process().wait_idle(WAIT).await);
        assert!(bridge.log().lock().unwrap().tail(10).contains("configured"));

        bridge.start_run(Some("echo explicit")).unwrap();
        assert!(bridge.process().wait_idle(WAIT).await);
        assert!(bridge.log().lock().unwrap().tail(10).contains("explicit"));
    }

    #[tokio::test]
    async fn run_uses_primary_root_as_cwd() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let (bridge, _rx) = bridge_with(vec![dir.path().to_path_buf()], GatewayConfig::default());
        bridge.start_run(Some("ls")).unwrap();
        assert!(bridge.process().wait_idle(WAIT).await);
        assert!(bridge.log().lock().unwrap().tail(10).contains("marker.txt"));
    }

    #[tokio::test]
    async fn save_hot_reloads_dart_files_only() {
        let config = GatewayConfig {
            auto_hot_reload_on_save: true,
            ..Default::default()
        };
        let (bridge, _rx) = bridge_with(vec![], config);

        // Nothing running yet
        assert!(!bridge.file_saved(Path::new("lib/main.dart")).await);

        bridge.start_run(Some("cat")).unwrap();
        assert!(!bridge.file_saved(Path::new("pubspec.yaml")).await);
        assert!(bridge.file_saved(Path::new("lib/main.dart")).await);
        assert!(wait_for_log(&bridge, "r").await);

        bridge.stop_run().await.unwrap();
        assert!(bridge.process().wait_idle(WAIT).await);
    }

    #[tokio::test]
    async fn save_does_nothing_when_disabled() {
        let (bridge, _rx) = bridge_with(vec![], GatewayConfig::default());
        bridge.start_run(Some("cat")).unwrap();
        assert!(!bridge.file_saved(Path::new("lib/main.dart")).await);
        bridge.stop_run().await.unwrap();
        assert!(bridge.process().wait_idle(WAIT).await);
    }

    #[tokio::test]
    async fn hot_restart_reaches_stdin() {
        let (bridge, _rx) = bridge_with(vec![], GatewayConfig::default());
        bridge.start_run(Some("cat")).unwrap();
        bridge.hot_restart().await.unwrap();
        assert!(wait_for_log(&bridge, "R").await);
        bridge.stop_run().await.unwrap();
        assert!(bridge.process().wait_idle(WAIT).await);
    }

    #[tokio::test]
    async fn preview_honors_configured_limits() {
        let config = GatewayConfig {
            max_log_lines: 1,
            ..Default::default()
        };
        let (bridge, _rx) = bridge_with(vec![], config);
        bridge.log().lock().unwrap().append("a\nb");
        let preview = bridge.context_preview().await;
        assert!(preview.ends_with("## Run log (last 1 lines)\nb"));
    }
}
