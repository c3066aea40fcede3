mod command;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use clawbridge_core::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use command::{COMMANDS, Command};

#[derive(Parser)]
#[command(name = "clawbridge", version, about = "Relay prompts and workspace context to a Clawdbot gateway")]
struct Args {
    /// Workspace folder (repeatable; the first is the primary root). Defaults to the current directory
    #[arg(short = 'w', long = "workspace")]
    workspace: Vec<PathBuf>,

    /// Settings file (defaults to ~/.clawbridge/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Gateway base URL, overrides the settings file
    #[arg(long, env = "CLAWBRIDGE_GATEWAY_URL")]
    gateway_url: Option<String>,

    /// Gateway bearer token, overrides the settings file
    #[arg(long, env = "CLAWBRIDGE_GATEWAY_TOKEN", hide_env_values = true)]
    gateway_token: Option<String>,

    /// Send prompts without workspace context
    #[arg(long)]
    no_context: bool,

    /// Attach a file before the first prompt (repeatable)
    #[arg(short = 'a', long = "attach")]
    attach: Vec<PathBuf>,

    /// Speak the JSON-lines message protocol on stdin/stdout
    #[arg(long, conflicts_with = "print_prompt")]
    json: bool,

    /// Run headlessly: send prompt, print the reply to stdout, exit
    #[arg(short = 'p', long = "print")]
    print_prompt: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set up file-based tracing (logs go to ~/.clawbridge/clawbridge.log)
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        let log_dir = PathBuf::from(&home).join(".clawbridge");
        std::fs::create_dir_all(&log_dir).ok();
        let log_file = std::fs::File::create(log_dir.join("clawbridge.log"))?;

        use tracing_subscriber::EnvFilter;
        let filter =
            EnvFilter::try_from_env("CLAWBRIDGE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(log_file)
            .with_ansi(false)
            .init();
    }

    let args = Args::parse();

    let folders = if args.workspace.is_empty() {
        vec![std::env::current_dir()?]
    } else {
        args.workspace
            .iter()
            .map(|p| std::fs::canonicalize(p).unwrap_or_else(|_| p.clone()))
            .collect()
    };

    // CLI env/flags override the settings file
    let source = FileConfigSource::new(
        args.config
            .clone()
            .unwrap_or_else(FileConfigSource::default_path),
    )
    .with_overrides(ConfigOverrides {
        gateway_url: args.gateway_url.clone(),
        gateway_token: args.gateway_token.clone(),
        include_workspace_context: args.no_context.then_some(false),
    });
    tracing::info!(config = %source.path().display(), folders = ?folders, "starting");

    let (display, display_rx) = mpsc::unbounded_channel();
    let bridge = Bridge::new(folders, Arc::new(source), display.clone());
    for path in &args.attach {
        bridge.attach(path);
    }

    // ── Headless mode: one prompt, reply on stdout ──
    if let Some(prompt) = args.print_prompt {
        drop(display_rx);
        return run_headless(&bridge, prompt).await;
    }

    let cancel = CancellationToken::new();
    let printer = tokio::spawn(print_display(display_rx, args.json, cancel.clone()));

    let result = if args.json {
        run_json(&bridge, &display).await
    } else {
        eprintln!("clawbridge: type a prompt, or /help for commands");
        run_interactive(&bridge, &display).await
    };

    if bridge.process().is_running() {
        let _ = bridge.stop_run().await;
    }
    cancel.cancel();
    let _ = printer.await;
    result
}

/// Send a single prompt and print the reply. Exits non-zero on failure.
async fn run_headless(bridge: &Bridge, prompt: String) -> anyhow::Result<()> {
    match bridge.send_prompt(prompt).await? {
        DispatchOutcome::Reply(text) => {
            println!("{}", text);
            Ok(())
        }
        other => {
            eprintln!("error: {}", other.message());
            std::process::exit(1);
        }
    }
}

/// Drain the display surface to stdout until cancelled, then flush what is
/// left.
async fn print_display(
    mut rx: mpsc::UnboundedReceiver<UiMessage>,
    json: bool,
    cancel: CancellationToken,
) {
    let emit = |msg: &UiMessage| {
        if json {
            match serde_json::to_string(msg) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("failed to encode display message: {e}"),
            }
        } else {
            println!("{}", msg.text());
        }
    };
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(msg) => emit(&msg),
                None => return,
            },
            _ = cancel.cancelled() => break,
        }
    }
    while let Ok(msg) = rx.try_recv() {
        emit(&msg);
    }
}

/// Read one line from stdin, or `None` on EOF / Ctrl-C.
async fn next_line(
    lines: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>,
) -> anyhow::Result<Option<String>> {
    tokio::select! {
        line = lines.next_line() => Ok(line?),
        _ = tokio::signal::ctrl_c() => Ok(None),
    }
}

/// JSON-lines mode: each stdin line is a `{"type":"send","text":...}`
/// message; display output is written back as `log` messages.
async fn run_json(bridge: &Bridge, display: &DisplaySender) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = Vec::new();
    while let Some(line) = next_line(&mut lines).await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<UiMessage>(&line) {
            Ok(msg) => in_flight.extend(bridge.handle(msg)),
            Err(e) => {
                let _ = display.send(UiMessage::log(format!("Invalid message: {e}")));
            }
        }
    }
    // Let replies to already-sent prompts arrive before exiting
    for handle in in_flight {
        let _ = handle.await;
    }
    Ok(())
}

/// Line REPL: plain lines are prompts, `/` lines are commands.
async fn run_interactive(bridge: &Bridge, display: &DisplaySender) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = next_line(&mut lines).await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match command::parse(line) {
            None => {
                bridge.send_prompt(line);
            }
            Some(Err(usage)) => {
                let _ = display.send(UiMessage::log(usage));
            }
            Some(Ok(Command::Exit)) => break,
            Some(Ok(cmd)) => execute(bridge, display, cmd).await,
        }
    }
    Ok(())
}

async fn execute(bridge: &Bridge, display: &DisplaySender, cmd: Command) {
    let show = |text: String| {
        let _ = display.send(UiMessage::log(text));
    };
    // Process errors are already reported on the display surface
    match cmd {
        Command::Run(command) => {
            let _ = bridge.start_run(command.as_deref());
        }
        Command::Reload => {
            let _ = bridge.hot_reload().await;
        }
        Command::Restart => {
            let _ = bridge.hot_restart().await;
        }
        Command::Stop => {
            let _ = bridge.stop_run().await;
        }
        Command::Attach(path) => {
            bridge.attach(&path);
        }
        Command::Detach(path) => {
            bridge.detach(&path);
        }
        Command::Attachments => {
            let paths = bridge.attachments();
            if paths.is_empty() {
                show("(no attached files)".into());
            } else {
                for p in paths {
                    show(p.display().to_string());
                }
            }
        }
        Command::ClearAttachments => bridge.clear_attachments(),
        Command::Focus(path, selection) => {
            bridge.focus(&path, selection);
            if let Some(active) = bridge.workspace().active {
                show(format!("Active file: {}", active.path.display()));
            }
        }
        Command::Unfocus => bridge.unfocus(),
        Command::SendSelection => {
            bridge.send_selection();
        }
        Command::Saved(path) => {
            if bridge.file_saved(&path).await {
                show(format!("Hot reload after saving {}", path.display()));
            }
        }
        Command::Context => show(bridge.context_preview().await),
        Command::Logs(n) => {
            let tail = bridge
                .log()
                .lock()
                .map(|log| log.tail(n.unwrap_or(50)))
                .unwrap_or_default();
            show(if tail.is_empty() {
                "(run log is empty)".into()
            } else {
                tail
            });
        }
        Command::Help => {
            let width = COMMANDS.iter().map(|(c, _)| c.len()).max().unwrap_or(0);
            for (cmd, desc) in COMMANDS {
                show(format!("{cmd:<width$}  {desc}"));
            }
        }
        Command::Exit => {}
    }
}
