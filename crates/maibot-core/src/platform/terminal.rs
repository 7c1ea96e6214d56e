//! Opening a new console window that runs a shell command.
//!
//! The bot, adapter and helper scripts each get their own window so their
//! output stays visible. When no graphical terminal is available the command
//! runs detached in the background with its output written to a log file.

use super::paths::find_in_path;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Linux terminal emulators, in order of preference.
pub const LINUX_TERMINALS: &[&str] = &[
    "x-terminal-emulator",
    "gnome-terminal",
    "konsole",
    "xfce4-terminal",
    "mate-terminal",
    "tilix",
    "xterm",
];

/// How a command will be hosted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalKind {
    /// A new `cmd` console (Windows).
    WindowsConsole,
    /// Terminal.app driven through `osascript` (macOS).
    MacTerminal,
    /// A terminal emulator found on `PATH`.
    Emulator(String),
    /// No window; output goes to a log file.
    Background,
}

impl TerminalKind {
    /// Pick the host for the current platform.
    pub fn detect() -> Self {
        if cfg!(windows) {
            TerminalKind::WindowsConsole
        } else if cfg!(target_os = "macos") {
            TerminalKind::MacTerminal
        } else {
            LINUX_TERMINALS
                .iter()
                .find(|name| find_in_path(name).is_some())
                .map(|name| TerminalKind::Emulator(name.to_string()))
                .unwrap_or(TerminalKind::Background)
        }
    }
}

/// Program and arguments that run `command` in `cwd` under a window titled `title`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalCommand {
    pub kind: TerminalKind,
    pub program: String,
    pub args: Vec<String>,
}

/// Quote a string for POSIX `sh`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn applescript_escape(value: &str) -> String {
    value.replace('\\', r"\\").replace('"', "\\\"")
}

impl TerminalCommand {
    /// Build for the detected terminal.
    pub fn new(title: &str, command: &str, cwd: &Path) -> Self {
        Self::for_kind(TerminalKind::detect(), title, command, cwd)
    }

    pub fn for_kind(kind: TerminalKind, title: &str, command: &str, cwd: &Path) -> Self {
        let cwd_str = cwd.to_string_lossy();
        let posix_script = format!("cd {} && {}", shell_quote(&cwd_str), command);

        let (program, args): (String, Vec<String>) = match &kind {
            TerminalKind::WindowsConsole => (
                "cmd".into(),
                vec![
                    "/k".into(),
                    format!("title {} && cd /d \"{}\" && {}", title, cwd_str, command),
                ],
            ),
            TerminalKind::MacTerminal => (
                "osascript".into(),
                vec![
                    "-e".into(),
                    format!(
                        "tell application \"Terminal\" to do script \"{}\"",
                        applescript_escape(&posix_script)
                    ),
                ],
            ),
            TerminalKind::Emulator(name) => {
                // Keep the window open after the command exits.
                let script = format!("{}; exec \"${{SHELL:-sh}}\"", posix_script);
                let args = match name.as_str() {
                    "gnome-terminal" => vec![
                        "--wait".into(),
                        format!("--title={}", title),
                        "--".into(),
                        "sh".into(),
                        "-c".into(),
                        script,
                    ],
                    "xfce4-terminal" | "mate-terminal" => vec![
                        format!("--title={}", title),
                        "-x".into(),
                        "sh".into(),
                        "-c".into(),
                        script,
                    ],
                    "tilix" => vec![
                        format!("--title={}", title),
                        "-e".into(),
                        format!("sh -c {}", shell_quote(&script)),
                    ],
                    "xterm" => vec![
                        "-T".into(),
                        title.into(),
                        "-e".into(),
                        "sh".into(),
                        "-c".into(),
                        script,
                    ],
                    _ => vec!["-e".into(), "sh".into(), "-c".into(), script],
                };
                (name.clone(), args)
            }
            TerminalKind::Background => {
                if cfg!(windows) {
                    ("cmd".into(), vec!["/C".into(), command.into()])
                } else {
                    ("sh".into(), vec!["-c".into(), posix_script])
                }
            }
        };

        Self {
            kind,
            program,
            args,
        }
    }

    /// Whether output should be redirected to a log file.
    pub fn is_background(&self) -> bool {
        self.kind == TerminalKind::Background
    }

    /// A `Command` ready to spawn. Working directory and detaching are left to the caller.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            if self.kind == TerminalKind::WindowsConsole {
                // cmd parses its own command line; avoid re-quoting.
                for arg in &self.args {
                    cmd.raw_arg(arg);
                }
                return cmd;
            }
        }

        cmd.args(&self.args);
        debug!("Terminal command: {} {:?}", self.program, self.args);
        cmd
    }
}

/// Open a file in the user's editor.
///
/// Tries VS Code, then `$VISUAL`/`$EDITOR`, then the platform default.
pub fn open_in_editor(path: &Path) -> std::io::Result<()> {
    let mut candidates: Vec<(String, Vec<String>)> = Vec::new();
    if find_in_path("code").is_some() {
        candidates.push(("code".into(), vec![]));
    }
    for var in ["VISUAL", "EDITOR"] {
        if let Ok(editor) = std::env::var(var) {
            if !editor.trim().is_empty() {
                candidates.push((editor.trim().to_string(), vec![]));
            }
        }
    }
    if cfg!(windows) {
        candidates.push(("notepad".into(), vec![]));
    } else if cfg!(target_os = "macos") {
        candidates.push(("open".into(), vec!["-t".into()]));
    } else {
        candidates.push(("xdg-open".into(), vec![]));
    }

    let mut last_error = None;
    for (program, args) in candidates {
        match Command::new(&program).args(&args).arg(path).spawn() {
            Ok(_) => {
                debug!("Opened {} with {}", path.display(), program);
                return Ok(());
            }
            Err(e) => {
                debug!("Editor {} failed: {}", program, e);
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| std::io::Error::other("no editor available")))
}

/// Open `url` in the default browser.
pub fn open_url(url: &str) -> std::io::Result<()> {
    let mut command = if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/c", "start", ""]);
        cmd
    } else if cfg!(target_os = "macos") {
        Command::new("open")
    } else {
        Command::new("xdg-open")
    };
    command.arg(url).spawn()?;
    debug!("Opened {} in the browser", url);
    Ok(())
}
