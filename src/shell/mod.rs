//! Remote shell execution for the `run` command.
//!
//! This is an arbitrary-code-execution surface. The only gate is the
//! Discord permission check on the command; nothing here restricts what
//! may be run.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::errors::AppError;

pub const DEFAULT_SHELL_TIMEOUT_SECS: u64 = 10;
/// Output longer than this is cut before it is shown.
pub const MAX_OUTPUT_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellOutcome {
    Success { output: String },
    Failed { output: String, code: Option<i32> },
    TimedOut { after: Duration },
}

impl ShellOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ShellOutcome::Success { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ShellRunner {
    timeout: Duration,
    max_output: usize,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_SHELL_TIMEOUT_SECS))
    }
}

impl ShellRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, max_output: MAX_OUTPUT_CHARS }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `command` through `sh -c`, capturing stdout and stderr interleaved.
    #[instrument(skip(self), fields(invocation = %uuid::Uuid::new_v4()))]
    pub async fn run(&self, command: &str) -> Result<ShellOutcome, AppError> {
        if command.trim().is_empty() {
            return Err(AppError::InvalidRequest("no command given".into()));
        }

        warn!(command = %command, "Executing shell command");

        let mut child = spawn_shell(command)?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::ShellError("stdout was not captured".into()))?;
        let mut group = GroupGuard::new(child.id());
        // Up to four bytes per char, enough for the displayed prefix.
        let capture = (self.max_output * 4) as u64;

        let finished = timeout(self.timeout, async {
            let mut buf = Vec::new();
            (&mut stdout).take(capture).read_to_end(&mut buf).await?;
            // Keep draining so the script never blocks on a full pipe.
            tokio::io::copy(&mut stdout, &mut tokio::io::sink()).await?;
            let status = child.wait().await?;
            Ok::<(ExitStatus, Vec<u8>), std::io::Error>((status, buf))
        })
        .await;

        match finished {
            Ok(Ok((status, buf))) => {
                group.disarm();
                let output = truncate_chars(&String::from_utf8_lossy(&buf), self.max_output);
                info!(exit_code = ?status.code(), "Shell command finished");
                if status.success() {
                    Ok(ShellOutcome::Success { output })
                } else {
                    Ok(ShellOutcome::Failed { output, code: status.code() })
                }
            }
            Ok(Err(e)) => Err(AppError::ShellError(format!("Failed to collect output: {}", e))),
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs_f32(), "Shell command timed out");
                terminate(&mut child, &mut group).await;
                Ok(ShellOutcome::TimedOut { after: self.timeout })
            }
        }
    }
}

fn spawn_shell(command: &str) -> Result<Child, AppError> {
    // `exec 2>&1` merges stderr into stdout for the whole script.
    let script = format!("exec 2>&1\n{}", command);

    let mut std_cmd = std::process::Command::new("sh");
    std_cmd
        .arg("-c")
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    // Own process group, so a timeout can take down everything the script started.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_cmd.process_group(0);
    }

    Command::from(std_cmd)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| AppError::ShellError(format!("Failed to spawn shell: {}", e)))
}

/// Kills the script's whole process group if dropped while armed, so a
/// cancelled run leaves nothing behind.
struct GroupGuard {
    pgid: Option<u32>,
    armed: bool,
}

impl GroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if self.armed {
            kill_group(self.pgid);
        }
    }
}

fn kill_group(pgid: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pgid) = pgid {
            if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                debug!(pgid, error = %e, "killpg failed");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pgid;
}

async fn terminate(child: &mut Child, group: &mut GroupGuard) {
    kill_group(group.pgid);
    group.disarm();

    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Child already gone");
    }
    match child.wait().await {
        Ok(status) => debug!(status = %status, "Timed out shell reaped"),
        Err(e) => warn!(error = %e, "Failed to reap timed out shell"),
    }
}

/// Keep at most `max` characters, never splitting one.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn runner() -> ShellRunner {
        ShellRunner::default()
    }

    #[tokio::test]
    async fn echo_succeeds_with_output() {
        let outcome = assert_ok!(runner().run("echo hello").await);
        match outcome {
            ShellOutcome::Success { output } => assert!(output.contains("hello")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_failure() {
        let outcome = assert_ok!(runner().run("exit 1").await);
        assert_eq!(outcome, ShellOutcome::Failed { output: String::new(), code: Some(1) });
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn stderr_is_captured_with_stdout() {
        let outcome = assert_ok!(runner().run("echo out; echo oops >&2; exit 3").await);
        match outcome {
            ShellOutcome::Failed { output, code } => {
                assert_eq!(code, Some(3));
                assert_eq!(output, "out\noops\n");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn long_output_is_truncated_to_the_display_limit() {
        let outcome = assert_ok!(runner().run("yes a | head -n 1500 | tr -d '\\n'").await);
        match outcome {
            ShellOutcome::Success { output } => {
                assert_eq!(output.chars().count(), MAX_OUTPUT_CHARS);
                assert!(output.chars().all(|c| c == 'a'));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn huge_output_is_cut_without_buffering_it() {
        let outcome = assert_ok!(runner().run("head -c 20000000 /dev/zero | tr '\\0' a").await);
        match outcome {
            ShellOutcome::Success { output } => {
                assert_eq!(output.chars().count(), MAX_OUTPUT_CHARS);
                assert!(output.chars().all(|c| c == 'a'));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    /// Dead or waiting to be reaped.
    #[cfg(unix)]
    fn is_dead(pid: i32) -> bool {
        match nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None) {
            Err(nix::errno::Errno::ESRCH) => true,
            _ => std::fs::read_to_string(format!("/proc/{pid}/stat"))
                .ok()
                .and_then(|stat| stat.rsplit_once(')').and_then(|(_, rest)| rest.trim_start().chars().next()))
                == Some('Z'),
        }
    }

    #[cfg(unix)]
    async fn wait_until_dead(pid: i32) -> bool {
        for _ in 0..100 {
            if is_dead(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[cfg(unix)]
    fn background_sleep(pid_file: &std::path::Path) -> String {
        format!("sleep 30 & echo $! > {}; wait", pid_file.display())
    }

    #[cfg(unix)]
    async fn read_pid(pid_file: &std::path::Path) -> i32 {
        let wait = async {
            loop {
                if let Some(pid) = std::fs::read_to_string(pid_file).ok().and_then(|s| s.trim().parse().ok()) {
                    return pid;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        timeout(Duration::from_secs(5), wait).await.unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_the_whole_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let runner = ShellRunner::new(Duration::from_millis(500));
        let started = std::time::Instant::now();

        let outcome = assert_ok!(runner.run(&background_sleep(&pid_file)).await);

        assert_eq!(outcome, ShellOutcome::TimedOut { after: Duration::from_millis(500) });
        assert!(started.elapsed() < Duration::from_secs(10));

        let pid = read_pid(&pid_file).await;
        assert!(wait_until_dead(pid).await, "background sleep {pid} outlived the timeout");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancelled_run_kills_the_whole_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let command = background_sleep(&pid_file);
        let runner = ShellRunner::new(Duration::from_secs(30));

        let task = tokio::spawn(async move { runner.run(&command).await });
        let pid = read_pid(&pid_file).await;
        assert!(!is_dead(pid));

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(wait_until_dead(pid).await, "background sleep {pid} outlived the cancelled run");
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        assert!(matches!(runner().run("   ").await, Err(AppError::InvalidRequest(_))));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 3), "");
    }
}
