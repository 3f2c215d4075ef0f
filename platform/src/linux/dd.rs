//! Raw copies between devices with `dd`. Destructive: the output device is
//! overwritten.

use super::run_tool;
use blkcrypt_core::{CommandOutput, CommandRunner, Config, Result};
use std::sync::Arc;
use tracing::Span;

pub struct DiskDump {
    runner: Arc<dyn CommandRunner>,
    tool: String,
    span: Span,
}

impl DiskDump {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &Config) -> Self {
        Self {
            runner,
            tool: config.tools.dd.clone(),
            span: tracing::info_span!("dd"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn command_line(
        &self,
        input: &str,
        output: &str,
        block_size: Option<&str>,
        count: Option<u64>,
    ) -> String {
        let mut command_line = format!("{} if={} of={}", self.tool, input, output);
        if let Some(bs) = block_size {
            command_line.push_str(&format!(" bs={}", bs));
        }
        if let Some(count) = count {
            command_line.push_str(&format!(" count={}", count));
        }
        command_line
    }

    /// Copy `input` to `output`, capturing dd's output. A nonzero exit is
    /// reported through [`CommandOutput::code`].
    pub fn dd(
        &self,
        input: &str,
        output: &str,
        block_size: Option<&str>,
        count: Option<u64>,
    ) -> Result<CommandOutput> {
        let _enter = self.span.enter();
        let command_line = self.command_line(input, output, block_size, count);
        tracing::info!(command = %command_line, "copying");
        run_tool(self.runner.as_ref(), &self.tool, &command_line)
    }

    /// Copy with dd's stdio attached to ours, returning its exit code.
    pub fn dd_passthrough(
        &self,
        input: &str,
        output: &str,
        block_size: Option<&str>,
        count: Option<u64>,
    ) -> i32 {
        let _enter = self.span.enter();
        let command_line = self.command_line(input, output, block_size, count);
        tracing::info!(command = %command_line, "copying");
        self.runner.call(&command_line)
    }
}
