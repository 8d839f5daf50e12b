//! Debugger subprocess supervision
//!
//! Interactive sessions keep one `--interpreter=mi` process alive and write
//! commands to its stdin. Batch queries start a fresh process per command and
//! collect its output when it exits.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::common::{lock, Error, Result};

use super::command::QUIT;

/// Arguments for a long-lived machine-interface process
pub fn interactive_args(target: &Path) -> Vec<OsString> {
    vec!["--interpreter=mi".into(), target.into()]
}

/// Arguments for a one-shot run of `commands`, ending with `quit`
pub fn batch_args(target: &Path, commands: &[&str]) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-q".into(), target.into()];
    for cmd in commands.iter().copied().chain(std::iter::once(QUIT)) {
        args.push("-ex".into());
        args.push(cmd.into());
    }
    args
}

/// Pipes of a freshly spawned interactive debugger
pub struct Spawned {
    pub supervisor: Supervisor,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Owner of one interactive debugger process
///
/// The stdin half is the only writer to the process; the session makes sure
/// at most one command is in flight when `send` is called.
pub struct Supervisor {
    child: Mutex<Option<Child>>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
}

impl Supervisor {
    /// Spawn `gdb --interpreter=mi <target>`
    pub fn spawn(gdb: &Path, target: &Path) -> Result<Spawned> {
        let mut cmd = Command::new(gdb);
        cmd.args(interactive_args(target))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::Spawn(format!("Failed to start {}: {}", gdb.display(), e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn("Failed to get debugger stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn("Failed to get debugger stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Spawn("Failed to get debugger stderr".to_string()))?;

        tracing::debug!(pid = ?child.id(), gdb = %gdb.display(), "Spawned debugger");

        Ok(Spawned {
            supervisor: Self {
                child: Mutex::new(Some(child)),
                stdin: tokio::sync::Mutex::new(Some(stdin)),
            },
            stdout,
            stderr,
        })
    }

    /// Write one command line to the debugger
    pub async fn send(&self, line: &str) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        let writer = stdin
            .as_mut()
            .ok_or_else(|| Error::SessionTerminated("debugger stdin is closed".to_string()))?;

        tracing::debug!(command = %line, "GDB >>>");
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Ask the debugger to quit, then make sure it is gone
    ///
    /// Safe to call any number of times.
    pub async fn shutdown(&self, grace: Duration) {
        let stdin = self.stdin.lock().await.take();
        let Some(mut stdin) = stdin else {
            return;
        };

        if self.is_running() {
            let _ = stdin.write_all(format!("{}\n", QUIT).as_bytes()).await;
            let _ = stdin.flush().await;
        }
        drop(stdin);

        // Wait a bit for clean shutdown
        let deadline = tokio::time::Instant::now() + grace;
        while self.is_running() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        self.kill();
    }

    /// Kill the process immediately (best-effort, never blocks)
    pub fn kill(&self) {
        if let Some(mut child) = lock(&self.child).take() {
            if matches!(child.try_wait(), Ok(None)) {
                tracing::debug!(pid = ?child.id(), "Killing debugger");
                let _ = child.start_kill();
            }
        }
    }

    /// Check if the debugger is still running
    pub fn is_running(&self) -> bool {
        lock(&self.child)
            .as_mut()
            .map(|child| matches!(child.try_wait(), Ok(None)))
            .unwrap_or(false)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // Best-effort since we can't await in drop
        self.kill();
    }
}

/// Captured output of a batch run
#[derive(Debug)]
pub struct BatchOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
}

/// Run `gdb -q <target> -ex <cmd>... -ex quit` to completion
///
/// Dropping the returned future, or hitting `limit`, kills the process.
pub async fn run_batch(
    gdb: &Path,
    target: &Path,
    commands: &[&str],
    limit: Option<Duration>,
) -> Result<Option<BatchOutput>> {
    let mut cmd = Command::new(gdb);
    cmd.args(batch_args(target, commands))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .map_err(|e| Error::Spawn(format!("Failed to start {}: {}", gdb.display(), e)))?;
    tracing::debug!(pid = ?child.id(), ?commands, "Spawned batch debugger");

    let wait = child.wait_with_output();
    let output = match limit {
        Some(limit) => match tokio::time::timeout(limit, wait).await {
            Ok(output) => output?,
            Err(_) => return Ok(None),
        },
        None => wait.await?,
    };

    Ok(Some(BatchOutput {
        stdout: output.stdout,
        stderr: output.stderr,
        exit_code: output.status.code(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interactive_args() {
        let args = interactive_args(Path::new("/b/os.elf"));
        assert_eq!(args, vec![OsString::from("--interpreter=mi"), OsString::from("/b/os.elf")]);
    }

    #[test]
    fn test_batch_args_end_with_quit() {
        let args = batch_args(Path::new("/b/os.elf"), &["info symbol 0x10", "info line a.c:3"]);
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-q",
                "/b/os.elf",
                "-ex",
                "info symbol 0x10",
                "-ex",
                "info line a.c:3",
                "-ex",
                "quit"
            ]
        );
    }

    #[tokio::test]
    async fn test_spawn_missing_executable() {
        let result = Supervisor::spawn(
            Path::new("/definitely/not/a/debugger"),
            Path::new("/b/os.elf"),
        );
        assert!(matches!(result, Err(Error::Spawn(_))));
    }

    #[tokio::test]
    async fn test_batch_missing_executable() {
        let result = run_batch(
            Path::new("/definitely/not/a/debugger"),
            Path::new("/b/os.elf"),
            &["info symbol 0x10"],
            None,
        )
        .await;
        assert!(matches!(result, Err(Error::Spawn(_))));
    }
}
