//! Launching, waiting on, and killing one tool process.

use super::CommandSpec;
use crate::cancellation::CancellationToken;
use crate::core::ExitInfo;
use crate::errors::VerifyError;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::debug;

/// One process launch.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProcessRequest<'a> {
    /// Stage label used in errors.
    pub stage: &'a str,
    /// What to run.
    pub command: &'a CommandSpec,
    /// Absolute working directory.
    pub cwd: &'a Path,
    /// Wall-clock limit after which the process group is killed.
    pub limit: Option<Duration>,
    /// Capture stdout instead of inheriting it.
    pub capture_stdout: bool,
}

/// How a launched process ended.
#[derive(Debug)]
pub(crate) enum ProcessOutcome {
    /// The process exited on its own.
    Exited {
        exit: ExitInfo,
        stdout: Option<String>,
    },
    /// The limit elapsed and the process group was killed.
    TimedOut,
}

/// Runs one process to completion, to its limit, or until cancellation.
///
/// Stderr is always inherited. The child gets its own process group so
/// that the whole tool tree can be killed together.
pub(crate) async fn run_process(
    request: ProcessRequest<'_>,
    cancel: &CancellationToken,
) -> Result<ProcessOutcome, VerifyError> {
    if !request.cwd.is_dir() {
        return Err(VerifyError::WorkingDirectory {
            path: request.cwd.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }

    let mut cmd = Command::new(&request.command.program);
    cmd.args(&request.command.args)
        .envs(&request.command.env)
        .current_dir(request.cwd)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    if request.capture_stdout {
        cmd.stdout(Stdio::piped());
    } else {
        cmd.stdout(Stdio::inherit());
    }
    #[cfg(unix)]
    cmd.process_group(0);

    debug!(
        stage = request.stage,
        command = %request.command.display(),
        cwd = %request.cwd.display(),
        "spawning tool"
    );

    let mut child = cmd.spawn().map_err(|source| VerifyError::Provisioning {
        stage: request.stage.to_string(),
        program: request.command.program.clone(),
        source,
    })?;

    let reader = child.stdout.take().map(|mut stdout| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await.map(|_| buf)
        })
    });

    let deadline = async {
        match request.limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        status = child.wait() => {
            let exit = ExitInfo::from(status?);
            let stdout = match reader {
                Some(handle) => {
                    let bytes = handle
                        .await
                        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;
                    Some(String::from_utf8_lossy(&bytes).into_owned())
                }
                None => None,
            };
            Ok(ProcessOutcome::Exited { exit, stdout })
        }
        () = cancel.cancelled() => {
            terminate(&mut child).await;
            Err(VerifyError::Interrupted {
                stage: request.stage.to_string(),
                reason: cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
            })
        }
        () = deadline => {
            terminate(&mut child).await;
            Ok(ProcessOutcome::TimedOut)
        }
    }
}

/// Kills the child's whole process group, then reaps the child.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            debug!(pid, %err, "killpg failed");
        }
    }

    if let Err(err) = child.kill().await {
        debug!(%err, "kill failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_exit_code_is_captured() {
        let cmd = sh("exit 3");
        let dir = tempfile::tempdir().unwrap();
        let outcome = run_process(
            ProcessRequest {
                stage: "t",
                command: &cmd,
                cwd: dir.path(),
                limit: None,
                capture_stdout: false,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        match outcome {
            ProcessOutcome::Exited { exit, stdout } => {
                assert_eq!(exit, ExitInfo::code(3));
                assert!(stdout.is_none());
            }
            ProcessOutcome::TimedOut => panic!("unexpected timeout"),
        }
    }

    #[tokio::test]
    async fn test_stdout_capture() {
        let cmd = sh("echo one; echo two");
        let dir = tempfile::tempdir().unwrap();
        let outcome = run_process(
            ProcessRequest {
                stage: "t",
                command: &cmd,
                cwd: dir.path(),
                limit: None,
                capture_stdout: true,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        match outcome {
            ProcessOutcome::Exited { stdout, .. } => {
                assert_eq!(stdout.as_deref(), Some("one\ntwo\n"));
            }
            ProcessOutcome::TimedOut => panic!("unexpected timeout"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_provisioning_error() {
        let cmd = CommandSpec::new("xdb-verify-no-such-tool");
        let dir = tempfile::tempdir().unwrap();
        let err = run_process(
            ProcessRequest {
                stage: "t",
                command: &cmd,
                cwd: dir.path(),
                limit: None,
                capture_stdout: false,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, VerifyError::Provisioning { .. }));
    }

    #[tokio::test]
    async fn test_missing_working_directory() {
        let cmd = sh("true");
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = run_process(
            ProcessRequest {
                stage: "t",
                command: &cmd,
                cwd: &missing,
                limit: None,
                capture_stdout: false,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, VerifyError::WorkingDirectory { .. }));
    }

    #[tokio::test]
    async fn test_limit_kills_process() {
        let cmd = sh("sleep 30");
        let dir = tempfile::tempdir().unwrap();
        let start = Instant::now();
        let outcome = run_process(
            ProcessRequest {
                stage: "t",
                command: &cmd,
                cwd: dir.path(),
                limit: Some(Duration::from_millis(200)),
                capture_stdout: false,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, ProcessOutcome::TimedOut));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_process() {
        let cmd = sh("sleep 30");
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                token.cancel("test interrupt");
            });
        }

        let start = Instant::now();
        let err = run_process(
            ProcessRequest {
                stage: "t",
                command: &cmd,
                cwd: dir.path(),
                limit: None,
                capture_stdout: false,
            },
            &token,
        )
        .await
        .unwrap_err();

        assert!(err.is_interrupt());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    /// Whether `pid` names a live, non-zombie process.
    #[cfg(target_os = "linux")]
    fn is_running(pid: &str) -> bool {
        std::fs::read_to_string(format!("/proc/{pid}/stat")).is_ok_and(|stat| {
            stat.rsplit_once(") ")
                .is_some_and(|(_, rest)| !rest.starts_with('Z'))
        })
    }

    #[cfg(target_os = "linux")]
    async fn assert_reaped(pid_file: &Path) {
        let pid = std::fs::read_to_string(pid_file).unwrap();
        let pid = pid.trim();
        let deadline = Instant::now() + Duration::from_secs(5);
        while is_running(pid) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(
            !is_running(pid),
            "background process {pid} outlived its stage"
        );
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_limit_kills_the_whole_process_group() {
        let cmd = sh("sleep 300 & echo $! > pid; wait");
        let dir = tempfile::tempdir().unwrap();
        let outcome = run_process(
            ProcessRequest {
                stage: "t",
                command: &cmd,
                cwd: dir.path(),
                limit: Some(Duration::from_millis(500)),
                capture_stdout: false,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, ProcessOutcome::TimedOut));
        assert_reaped(&dir.path().join("pid")).await;
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_cancellation_kills_the_whole_process_group() {
        let cmd = sh("sleep 300 & echo $! > pid; wait");
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                token.cancel("test interrupt");
            });
        }

        let err = run_process(
            ProcessRequest {
                stage: "t",
                command: &cmd,
                cwd: dir.path(),
                limit: None,
                capture_stdout: false,
            },
            &token,
        )
        .await
        .unwrap_err();

        assert!(err.is_interrupt());
        assert_reaped(&dir.path().join("pid")).await;
    }
}
