use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Runs `program`, feeding `input` on stdin, and returns its stdout.
///
/// The child is killed once `timeout` elapses. A non-zero exit is an error
/// carrying whatever the program wrote to stderr.
pub fn run_command(
    program: &str,
    args: &[&OsStr],
    input: Option<&[u8]>,
    timeout: Duration,
) -> Result<Vec<u8>, ProcessError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;

    // stdin is written on its own thread so a child that fills its stdout pipe
    // before draining stdin cannot deadlock us.
    let writer = match (input, child.stdin.take()) {
        (Some(data), Some(mut stdin)) => {
            let data = data.to_vec();
            Some(thread::spawn(move || {
                let _ = stdin.write_all(&data);
            }))
        }
        _ => None,
    };
    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    // A budget too large for `Instant` means no deadline at all.
    let deadline = Instant::now().checked_add(timeout);
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if deadline.is_some_and(|deadline| Instant::now() >= deadline) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProcessError::Timeout {
                    program: program.to_string(),
                    timeout,
                });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => {
                let _ = child.kill();
                return Err(ProcessError::Wait {
                    program: program.to_string(),
                    source,
                });
            }
        }
    };

    if let Some(handle) = writer {
        let _ = handle.join();
    }
    let stdout = collect(stdout);
    let stderr = collect(stderr);

    if !status.success() {
        return Err(ProcessError::Failed {
            program: program.to_string(),
            status,
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }

    Ok(stdout)
}

/// Runs `job` on a worker thread and gives up on it after `timeout`.
///
/// An abandoned job keeps running to completion in the background; its result
/// is discarded.
pub fn run_bounded<T, F>(timeout: Duration, job: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(job());
    });
    rx.recv_timeout(timeout).ok()
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_job_returns_result() {
        assert_eq!(run_bounded(Duration::from_secs(5), || 21 * 2), Some(42));
    }

    #[test]
    fn bounded_job_times_out() {
        let result = run_bounded(Duration::from_millis(20), || {
            thread::sleep(Duration::from_millis(500));
            1
        });
        assert!(result.is_none());
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = run_command(
            "to-utf8-no-such-program",
            &[],
            None,
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn pipes_input_through() {
        let out = run_command("cat", &[], Some(b"hello"), Duration::from_secs(5)).expect("cat");
        assert_eq!(out, b"hello");
    }

    #[cfg(unix)]
    #[test]
    fn enormous_budget_runs_without_deadline() {
        let out = run_command(
            "cat",
            &[],
            Some(b"ok"),
            Duration::from_secs(u64::MAX / 2),
        )
        .expect("cat");
        assert_eq!(out, b"ok");
    }

    #[test]
    fn bounded_job_accepts_enormous_budget() {
        assert_eq!(run_bounded(Duration::from_secs(u64::MAX / 2), || 7), Some(7));
    }

    #[cfg(unix)]
    #[test]
    fn slow_program_is_killed() {
        let err = run_command(
            "sh",
            &[OsStr::new("-c"), OsStr::new("sleep 5")],
            None,
            Duration::from_millis(100),
        )
        .unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn failing_program_reports_stderr() {
        let err = run_command(
            "sh",
            &[OsStr::new("-c"), OsStr::new("echo broken >&2; exit 3")],
            None,
            Duration::from_secs(5),
        )
        .unwrap_err();
        match err {
            ProcessError::Failed { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
