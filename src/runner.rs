use serde::Serialize;
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use thiserror::Error;
use tracing::{debug, warn};

use crate::signals;

/// Captured outcome of one external invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn lines(&self) -> Vec<&str> {
        split_lines(&self.stdout)
    }

    pub fn first_line(&self) -> Option<&str> {
        self.lines().into_iter().next()
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("executable not found: {program}")]
    ExecutableNotFound { program: String },
    #[error("failed to spawn {program}")]
    SpawnFailed {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} produced output that is not valid UTF-8 (at byte {valid_up_to})")]
    NonTextOutput { program: String, valid_up_to: usize },
    #[error("i/o error while running {program}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("interrupted by signal {signal}")]
    Interrupted { signal: i32 },
}

/// Runs a command line synchronously and captures what it prints.
///
/// The command line is an argument vector handed straight to the OS; nothing
/// goes through a shell.
#[derive(Debug, Clone, Default)]
pub struct ExternalCommandRunner;

impl ExternalCommandRunner {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, command_line: &[String]) -> Result<CommandResult, RunError> {
        let (program, args) = command_line
            .split_first()
            .ok_or_else(|| RunError::SpawnFailed {
                program: String::new(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty command line"),
            })?;

        if let Some(signal) = signals::pending() {
            return Err(RunError::Interrupted { signal });
        }

        debug!(program = %program, args = ?args, "spawning host command");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(program, e))?;

        let mut guard = ChildGuard::new(child);
        let (stdout, stderr) = guard.capture().map_err(|source| RunError::Io {
            program: program.clone(),
            source,
        })?;
        let status = guard.wait().map_err(|source| RunError::Io {
            program: program.clone(),
            source,
        })?;
        drop(guard);

        if let Some(signal) = signals::pending() {
            warn!(program = %program, signal, "host command interrupted");
            return Err(RunError::Interrupted { signal });
        }

        let exit_code = exit_code_of(status);
        debug!(
            program = %program,
            exit_code,
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            "host command exited"
        );

        let stdout = String::from_utf8(stdout).map_err(|e| RunError::NonTextOutput {
            program: program.clone(),
            valid_up_to: e.utf8_error().valid_up_to(),
        })?;

        Ok(CommandResult {
            exit_code,
            stdout,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

fn spawn_error(program: &str, err: io::Error) -> RunError {
    if err.kind() == io::ErrorKind::NotFound {
        RunError::ExecutableNotFound {
            program: program.to_string(),
        }
    } else {
        RunError::SpawnFailed {
            program: program.to_string(),
            source: err,
        }
    }
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Owns the child until it has been reaped. Dropping an unreaped child kills
/// and waits for it, so no exit path leaves a zombie or orphan behind.
struct ChildGuard {
    child: Child,
    reaped: bool,
    forwarding: Option<signals::Forwarding>,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        let forwarding = signals::forward_to(child.id());
        Self {
            child,
            reaped: false,
            forwarding: Some(forwarding),
        }
    }

    fn capture(&mut self) -> io::Result<(Vec<u8>, Vec<u8>)> {
        let stdout = self.child.stdout.take();
        let stderr = self.child.stderr.take();
        let child = &mut self.child;
        capture_pipes(stdout, stderr, || {
            let _ = child.kill();
        })
    }

    fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait();
        // The pid is free for reuse once reaped; stop relaying to it.
        self.forwarding = None;
        let status = status?;
        self.reaped = true;
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        self.forwarding = None;
    }
}

/// Read stdout to the end while stderr drains on a scoped thread, so a full
/// stderr pipe cannot stall the child. If stdout fails, `abort` runs before
/// the stderr reader is joined so a child holding stderr open cannot hang us.
fn capture_pipes<O, E>(
    stdout: Option<O>,
    stderr: Option<E>,
    abort: impl FnOnce(),
) -> io::Result<(Vec<u8>, Vec<u8>)>
where
    O: Read,
    E: Read + Send,
{
    thread::scope(|scope| -> io::Result<(Vec<u8>, Vec<u8>)> {
        let stderr_reader = scope.spawn(move || read_all(stderr));
        let out = match read_all(stdout) {
            Ok(out) => out,
            Err(e) => {
                abort();
                let _ = stderr_reader.join();
                return Err(e);
            }
        };
        let err = stderr_reader.join().unwrap_or_else(|_| Ok(Vec::new()))?;
        Ok((out, err))
    })
}

fn read_all<R: Read>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf)?;
    }
    Ok(buf)
}

/// Split text into lines, accepting `\n`, `\r\n` and `\r` as terminators.
/// A trailing terminator does not produce an empty final line.
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        match rest.find(['\n', '\r']) {
            Some(idx) => {
                lines.push(&rest[..idx]);
                let width = if rest[idx..].starts_with("\r\n") { 2 } else { 1 };
                rest = &rest[idx + width..];
            }
            None => {
                lines.push(rest);
                break;
            }
        }
    }
    lines
}
