// src/tools/command.rs

//! Running shell commands with captured output.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Last `n` non-empty lines of stderr, for error messages.
    pub fn stderr_tail(&self, n: usize) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].join("\n")
    }

    /// stdout lines followed by stderr lines.
    pub fn log_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.stdout)
            .lines()
            .chain(String::from_utf8_lossy(&self.stderr).lines())
            .map(str::to_string)
            .collect()
    }

    pub fn exit_label(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Build a shell command appropriate for the platform.
pub fn shell_command(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

/// Run `cmd` through the shell in `cwd` and capture both output streams.
///
/// A non-zero exit is not an error here; callers decide what it means.
pub async fn run_captured(cmd: &str, cwd: &Path) -> Result<CommandOutput> {
    debug!(cmd, cwd = ?cwd, "running command");

    let mut command = shell_command(cmd);
    if !cwd.as_os_str().is_empty() {
        command.current_dir(cwd);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = command
        .output()
        .await
        .with_context(|| format!("spawning `{cmd}` in {:?}", cwd))?;

    debug!(
        cmd,
        code = ?output.status.code(),
        stdout_bytes = output.stdout.len(),
        "command exited"
    );

    Ok(CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Replace every `{name}` placeholder in `template` with `value`.
pub fn substitute(template: &str, name: &str, value: &str) -> String {
    template.replace(&format!("{{{name}}}"), value)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let out = run_captured("printf 'a\\nb'; echo oops >&2; exit 3", Path::new(""))
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout, b"a\nb");
        assert_eq!(out.stderr_tail(5), "oops");
        assert_eq!(out.log_lines(), vec!["a", "b", "oops"]);
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let out = run_captured("cat marker.txt", dir.path()).await.unwrap();
        assert!(out.success);
        assert_eq!(out.stdout, b"here");
    }

    #[test]
    fn substitutes_placeholders() {
        assert_eq!(
            substitute("browserify {entry} --standalone vl", "entry", "src/vl.js"),
            "browserify src/vl.js --standalone vl"
        );
    }
}
