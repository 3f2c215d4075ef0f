/// Test utilities and mock implementations for safe testing
use crate::{CommandOutput, CommandRunner, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Exit code returned for commands that were never scripted.
pub const UNSCRIPTED_EXIT_CODE: i32 = 127;

/// Command runner that replays scripted outputs - NEVER spawns a process
#[derive(Clone, Default)]
pub struct MockCommandRunner {
    responses: Arc<Mutex<HashMap<String, CommandOutput>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the output for an exact command line.
    pub fn respond(self, command_line: &str, code: i32, stdout: &str, stderr: &str) -> Self {
        self.responses.lock().unwrap().insert(
            command_line.to_string(),
            CommandOutput {
                code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
        );
        self
    }

    pub fn succeed(self, command_line: &str, stdout: &str) -> Self {
        self.respond(command_line, 0, stdout, "")
    }

    pub fn fail(self, command_line: &str, stderr: &str) -> Self {
        self.respond(command_line, 1, "", stderr)
    }

    /// Every command line seen by `run` or `call`, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn lookup(&self, command_line: &str) -> CommandOutput {
        self.calls.lock().unwrap().push(command_line.to_string());
        self.responses
            .lock()
            .unwrap()
            .get(command_line)
            .cloned()
            .unwrap_or_else(|| CommandOutput {
                code: UNSCRIPTED_EXIT_CODE,
                stdout: String::new(),
                stderr: format!("unscripted command: {}", command_line),
            })
    }
}

impl CommandRunner for MockCommandRunner {
    fn run(&self, command_line: &str, _input: Option<&[u8]>) -> Result<CommandOutput> {
        Ok(self.lookup(command_line))
    }

    fn call(&self, command_line: &str) -> i32 {
        self.lookup(command_line).code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_scripted_output_and_records_calls() {
        let runner = MockCommandRunner::new()
            .succeed("uname -n", "myhost\n")
            .fail("tune2fs -l /dev/sdb", "Bad magic number");

        let out = runner.run("uname -n", None).unwrap();
        assert_eq!(out.stdout, "myhost\n");
        assert!(out.success());

        let out = runner.run("tune2fs -l /dev/sdb", None).unwrap();
        assert_eq!(out.code, 1);
        assert_eq!(out.stderr, "Bad magic number");

        assert_eq!(runner.calls(), vec!["uname -n", "tune2fs -l /dev/sdb"]);
    }

    #[test]
    fn unscripted_commands_fail() {
        let runner = MockCommandRunner::new();
        assert_eq!(runner.call("dd if=/dev/zero of=/dev/null"), UNSCRIPTED_EXIT_CODE);
        assert_eq!(runner.call_count(), 1);
    }
}
