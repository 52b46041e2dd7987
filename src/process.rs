// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use std::io::{self, Read};
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Timeout for `docker` queries.
pub const DOCKER_TIMEOUT_SECS: u64 = 10;

/// Timeout for trust-store refresh commands.
pub const TRUST_UPDATE_TIMEOUT_SECS: u64 = 30;

/// Run a command with a timeout and capture its output.
///
/// stdin is closed so nothing can block on a prompt. Both pipes are drained
/// while waiting, so a chatty command cannot stall on a full pipe. A command
/// that outlives the timeout is killed and reaped.
pub fn run_command_with_timeout(
    command: &str,
    args: &[&str],
    timeout_secs: u64,
) -> Result<Output> {
    tracing::debug!(command, ?args, timeout_secs, "running command");

    let command_error = |e: io::Error| Error::Command {
        command: command.to_string(),
        stderr: e.to_string(),
    };

    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::CommandNotFound {
                    command: command.to_string(),
                    hint: install_hint(command),
                }
            } else {
                command_error(e)
            }
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let timeout = Duration::from_secs(timeout_secs);
    let start = Instant::now();

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    // Reap after kill to avoid zombies
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::warn!(command, timeout_secs, "command timed out");
                    return Err(Error::CommandTimeout {
                        command: command.to_string(),
                        seconds: timeout_secs,
                    });
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => return Err(command_error(e)),
        }
    };

    Ok(Output {
        status,
        stdout: collect(stdout).map_err(command_error)?,
        stderr: collect(stderr).map_err(command_error)?,
    })
}

type Drain = Option<JoinHandle<io::Result<Vec<u8>>>>;

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Drain {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

fn collect(handle: Drain) -> io::Result<Vec<u8>> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| io::Error::other("output reader panicked"))?,
        None => Ok(Vec::new()),
    }
}

/// Run a command and fail unless it exits successfully. Returns stdout.
pub fn run_checked(command: &str, args: &[&str], timeout_secs: u64) -> Result<String> {
    let output = run_command_with_timeout(command, args, timeout_secs)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stderr = if stderr.is_empty() {
            format!("exited with {}", output.status)
        } else {
            stderr
        };
        return Err(Error::Command {
            command: std::iter::once(command)
                .chain(args.iter().copied())
                .collect::<Vec<_>>()
                .join(" "),
            stderr,
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Get installation hint for missing commands
pub fn install_hint(command: &str) -> String {
    match command {
        "docker" => "Install Docker Engine: https://docs.docker.com/engine/install/".to_string(),
        "update-ca-certificates" => {
            "Install ca-certificates package: apt install ca-certificates".to_string()
        }
        "update-ca-trust" => {
            "Install ca-certificates package: dnf install ca-certificates".to_string()
        }
        "trust" => "Install p11-kit-trust package: pacman -S p11-kit".to_string(),
        _ => format!("Please install the '{}' command", command),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_captures_stdout() {
        let output = run_command_with_timeout("sh", &["-c", "echo hello"], 5).unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[test]
    fn test_run_command_not_found() {
        let err = run_command_with_timeout("stackssl-no-such-command", &[], 5).unwrap_err();
        assert!(matches!(err, Error::CommandNotFound { .. }));
    }

    #[test]
    fn test_run_command_timeout_kills_child() {
        let start = Instant::now();
        let err = run_command_with_timeout("sleep", &["5"], 1).unwrap_err();
        assert!(matches!(err, Error::CommandTimeout { seconds: 1, .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_run_checked_drains_large_output() {
        let start = Instant::now();
        let stdout =
            run_checked("sh", &["-c", "head -c 100000 /dev/zero | tr '\\0' a"], 3).unwrap();
        assert_eq!(stdout.len(), 100_000);
        assert!(stdout.bytes().all(|b| b == b'a'));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_run_command_drains_large_stderr() {
        let output = run_command_with_timeout(
            "sh",
            &["-c", "head -c 100000 /dev/zero >&2; echo done"],
            3,
        )
        .unwrap();
        assert!(output.status.success());
        assert_eq!(output.stderr.len(), 100_000);
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "done");
    }

    #[test]
    fn test_run_checked_reports_failure() {
        let err = run_checked("sh", &["-c", "echo boom >&2; exit 3"], 5).unwrap_err();
        match err {
            Error::Command { command, stderr } => {
                assert!(command.starts_with("sh -c"));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_install_hint() {
        assert!(install_hint("docker").contains("Docker"));
        assert!(install_hint("trust").contains("p11-kit"));
        assert!(install_hint("whatever").contains("'whatever'"));
    }
}
