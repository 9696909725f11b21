use std::io::ErrorKind;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

const POLL_STEP: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Failed to execute {program}: {source}")]
    ExecutionFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    NonZeroExit {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("{program} timed out after {timeout_ms}ms")]
    TimedOut { program: String, timeout_ms: u128 },
}

/// Run a read-only command and return its stdout
pub fn run(program: &str, args: &[String]) -> Result<String, CommandError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| spawn_error(program, e))?;

    finish(program, output)
}

/// Run a command, killing it if it outlives `timeout`.
///
/// Only suitable for commands with small output: stdout is drained after exit.
pub fn run_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<String, CommandError> {
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CommandError::TimedOut {
                    program: program.to_string(),
                    timeout_ms: timeout.as_millis(),
                });
            }
            Ok(None) => thread::sleep(POLL_STEP),
            Err(e) => return Err(spawn_error(program, e)),
        }
    }

    let output = child
        .wait_with_output()
        .map_err(|e| spawn_error(program, e))?;
    finish(program, output)
}

fn finish(program: &str, output: Output) -> Result<String, CommandError> {
    if !output.status.success() {
        return Err(CommandError::NonZeroExit {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    debug!(program, bytes = output.stdout.len(), "command finished");
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn spawn_error(program: &str, e: std::io::Error) -> CommandError {
    if e.kind() == ErrorKind::NotFound {
        return CommandError::NotFound(program.to_string());
    }
    CommandError::ExecutionFailed {
        program: program.to_string(),
        source: e,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_run_captures_stdout() {
        let out = run("sh", &args(&["-c", "echo hello"])).unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn test_run_reports_non_zero_exit() {
        let err = run("sh", &args(&["-c", "echo oops >&2; exit 3"])).unwrap_err();
        match err {
            CommandError::NonZeroExit { stderr, .. } => assert_eq!(stderr, "oops"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_run_reports_missing_program() {
        let err = run("pulse-definitely-missing-tool", &[]).unwrap_err();
        assert!(matches!(err, CommandError::NotFound(_)));
    }

    #[test]
    fn test_run_with_timeout_kills_slow_command() {
        let err = run_with_timeout("sh", &args(&["-c", "sleep 5"]), Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, CommandError::TimedOut { .. }));
    }

    #[test]
    fn test_run_with_timeout_returns_output() {
        let out =
            run_with_timeout("sh", &args(&["-c", "echo 42"]), Duration::from_secs(5)).unwrap();
        assert_eq!(out.trim(), "42");
    }
}
