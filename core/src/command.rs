use crate::{shell, BlkcryptError, Result};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

/// Exit code reported by [`CommandRunner::call`] when the command could not be run at all.
pub const ERROR_EXIT_CODE: i32 = 1;

/// Exit code and captured output of a finished command.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs external tools on behalf of the device components.
///
/// A nonzero exit status is a normal outcome and is reported through
/// [`CommandOutput::code`]; only failing to start the process is an error.
pub trait CommandRunner: Send + Sync {
    /// Run `command_line`, feeding `input` on stdin, and capture stdout/stderr.
    fn run(&self, command_line: &str, input: Option<&[u8]>) -> Result<CommandOutput>;

    /// Run `command_line` with inherited stdio. Never fails: problems are
    /// logged and reported as [`ERROR_EXIT_CODE`].
    fn call(&self, command_line: &str) -> i32;
}

/// [`CommandRunner`] backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(command_line: &str) -> Result<Command> {
        let argv = shell::split(command_line)?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| BlkcryptError::InvalidInput("empty command line".to_string()))?;
        let mut command = Command::new(program);
        command.args(args);
        Ok(command)
    }
}

/// Exit code in the `subprocess` convention: negative signal number when killed.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| signal_code(status))
        .unwrap_or(ERROR_EXIT_CODE)
}

#[cfg(unix)]
fn signal_code(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|sig| -sig)
}

#[cfg(not(unix))]
fn signal_code(_status: ExitStatus) -> Option<i32> {
    None
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, command_line: &str, input: Option<&[u8]>) -> Result<CommandOutput> {
        tracing::debug!(command = command_line, "running");

        let mut child = Self::command(command_line)?
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Feed stdin while the output pipes drain; the writer drops the handle
        // when done so the child sees EOF. EPIPE means the child stopped reading.
        let writer = match (child.stdin.take(), input) {
            (Some(mut stdin), Some(data)) => {
                let data = data.to_vec();
                Some(thread::spawn(move || match stdin.write_all(&data) {
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                    other => other,
                }))
            }
            _ => None,
        };

        let output = child.wait_with_output()?;
        if let Some(writer) = writer {
            writer
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "stdin writer panicked"))??;
        }
        let result = CommandOutput {
            code: exit_code(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            tracing::debug!(command = command_line, code = result.code, "command exited nonzero");
        }

        Ok(result)
    }

    fn call(&self, command_line: &str) -> i32 {
        let status = Self::command(command_line).and_then(|mut command| Ok(command.status()?));
        match status {
            Ok(status) => exit_code(status),
            Err(e) => {
                tracing::error!(command = command_line, "Error running: {}", e);
                ERROR_EXIT_CODE
            }
        }
    }
}
