use std::path::PathBuf;

use clawbridge_core::editor::Selection;

/// Commands listed by `/help` (usage, description).
pub const COMMANDS: &[(&str, &str)] = &[
    ("/run [command]", "Start a run session (defaults to flutterRunCommand)"),
    ("/reload", "Hot reload the running app"),
    ("/restart", "Hot restart the running app"),
    ("/stop", "Stop the run session"),
    ("/attach <path>", "Attach a file to every prompt"),
    ("/detach <path>", "Remove an attached file"),
    ("/attachments", "List attached files"),
    ("/clear-attachments", "Remove all attached files"),
    ("/focus <path> [N[-M]]", "Set the active file and selected lines"),
    ("/unfocus", "Clear the active file"),
    ("/selection", "Send the selected lines as a prompt"),
    ("/saved <path>", "Report a saved file (may hot reload)"),
    ("/context", "Show the context the next prompt would carry"),
    ("/logs [n]", "Show the last n run log lines"),
    ("/help", "Show commands"),
    ("/exit", "Quit"),
];

/// Slash commands recognized by the REPL.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Run(Option<String>),
    Reload,
    Restart,
    Stop,
    Attach(PathBuf),
    Detach(PathBuf),
    Attachments,
    ClearAttachments,
    Focus(PathBuf, Option<Selection>),
    Unfocus,
    SendSelection,
    Saved(PathBuf),
    Context,
    Logs(Option<usize>),
    Help,
    Exit,
}

/// Parse a slash command from user input.
///
/// Returns `None` when the input is a plain prompt, `Some(Err(usage))` when
/// it looks like a command but cannot be used as one.
pub fn parse(input: &str) -> Option<Result<Command, String>> {
    let trimmed = input.trim();
    let rest = trimmed.strip_prefix('/')?;
    let (cmd, arg) = match rest.split_once(char::is_whitespace) {
        Some((c, a)) => (c, Some(a.trim()).filter(|a| !a.is_empty())),
        None => (rest, None),
    };
    let path = |usage: &str| {
        arg.map(PathBuf::from)
            .ok_or_else(|| format!("Usage: {usage}"))
    };
    let parsed = match cmd {
        "run" => Ok(Command::Run(arg.map(str::to_string))),
        "reload" | "r" => Ok(Command::Reload),
        "restart" | "R" => Ok(Command::Restart),
        "stop" => Ok(Command::Stop),
        "attach" => path("/attach <path>").map(Command::Attach),
        "detach" => path("/detach <path>").map(Command::Detach),
        "attachments" => Ok(Command::Attachments),
        "clear-attachments" => Ok(Command::ClearAttachments),
        "focus" => parse_focus(arg),
        "unfocus" => Ok(Command::Unfocus),
        "selection" => Ok(Command::SendSelection),
        "saved" => path("/saved <path>").map(Command::Saved),
        "context" => Ok(Command::Context),
        "logs" => match arg {
            None => Ok(Command::Logs(None)),
            Some(n) => n
                .parse()
                .map(|n| Command::Logs(Some(n)))
                .map_err(|_| format!("Not a line count: {n}")),
        },
        "help" | "?" => Ok(Command::Help),
        "exit" | "quit" => Ok(Command::Exit),
        other => Err(format!("Unknown command: /{other} (try /help)")),
    };
    Some(parsed)
}

fn parse_focus(arg: Option<&str>) -> Result<Command, String> {
    let arg = arg.ok_or_else(|| "Usage: /focus <path> [N[-M]]".to_string())?;
    match arg.rsplit_once(char::is_whitespace) {
        Some((path, range)) if range.starts_with(|c: char| c.is_ascii_digit()) => {
            let selection = range.parse::<Selection>()?;
            Ok(Command::Focus(PathBuf::from(path.trim()), Some(selection)))
        }
        _ => Ok(Command::Focus(PathBuf::from(arg), None)),
    }
}
