use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context};
use serde_json::Value;
use tracing::debug;

/// Runs opaque action descriptors. No sandboxing is applied.
pub trait ActionRunner: Send + Sync {
    /// Run `action`. `Ok(None)` means success without output.
    fn run(&self, action: &str) -> anyhow::Result<Option<Value>>;
}

/// Runs action text through the platform shell inside a working directory.
#[derive(Debug, Clone)]
pub struct ShellActionRunner {
    shell: String,
    shell_args: Vec<String>,
    working_dir: PathBuf,
}

impl ShellActionRunner {
    /// Runner using the detected platform shell.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let (shell, shell_args) = detect_shell();
        Self {
            shell,
            shell_args,
            working_dir: working_dir.into(),
        }
    }

    /// Runner using an explicit shell invocation, e.g. `("/bin/zsh", ["-c"])`.
    pub fn with_shell(
        working_dir: impl Into<PathBuf>,
        shell: impl Into<String>,
        shell_args: Vec<String>,
    ) -> Self {
        Self {
            shell: shell.into(),
            shell_args,
            working_dir: working_dir.into(),
        }
    }
}

fn detect_shell() -> (String, Vec<String>) {
    if cfg!(windows) {
        return ("cmd".to_string(), vec!["/C".to_string()]);
    }
    let shell = std::env::var("SHELL")
        .ok()
        .filter(|s| Path::new(s).exists())
        .or_else(|| {
            ["/bin/bash", "/bin/sh"]
                .into_iter()
                .find(|s| Path::new(s).exists())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "/bin/sh".to_string());
    (shell, vec!["-c".to_string()])
}

impl ActionRunner for ShellActionRunner {
    fn run(&self, action: &str) -> anyhow::Result<Option<Value>> {
        debug!(shell = %self.shell, cwd = %self.working_dir.display(), "running action");
        let output = Command::new(&self.shell)
            .args(&self.shell_args)
            .arg(action)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("spawning shell {}", self.shell))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let mut message = format!("action exited with status {:?}", output.status.code());
            if !stdout.trim().is_empty() {
                message.push_str("\n\nStdout:\n");
                message.push_str(stdout.trim_end());
            }
            if !stderr.trim().is_empty() {
                message.push_str("\n\nStderr:\n");
                message.push_str(stderr.trim_end());
            }
            return Err(anyhow!(message));
        }

        let trimmed = stdout.trim();
        Ok((!trimmed.is_empty()).then(|| Value::String(trimmed.to_string())))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn runner(dir: &Path) -> ShellActionRunner {
        ShellActionRunner::with_shell(dir, "/bin/sh", vec!["-c".into()])
    }

    #[test]
    fn captures_stdout() {
        let dir = TempDir::new().unwrap();
        let out = runner(dir.path()).run("echo hello").unwrap();
        assert_eq!(out, Some(Value::String("hello".into())));
    }

    #[test]
    fn silent_success_has_no_output() {
        let dir = TempDir::new().unwrap();
        assert_eq!(runner(dir.path()).run("true").unwrap(), None);
    }

    #[test]
    fn runs_in_working_dir() {
        let dir = TempDir::new().unwrap();
        runner(dir.path()).run("touch created.txt").unwrap();
        assert!(dir.path().join("created.txt").exists());
    }

    #[test]
    fn failure_carries_exit_status_and_stderr() {
        let dir = TempDir::new().unwrap();
        let err = runner(dir.path())
            .run("echo boom >&2; exit 3")
            .unwrap_err()
            .to_string();
        assert!(err.contains("Some(3)"), "{err}");
        assert!(err.contains("boom"), "{err}");
    }
}
