//! ext2/3/4 superblock metadata through `tune2fs -l`.

use super::run_tool;
use blkcrypt_core::{AttributeMap, BlkcryptError, CommandRunner, Config, Result};
use std::sync::Arc;
use tracing::Span;

pub const LAST_MOUNTED_ON: &str = "Last mounted on";

pub struct Tune2fs {
    runner: Arc<dyn CommandRunner>,
    tool: String,
    span: Span,
}

impl Tune2fs {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &Config) -> Self {
        Self {
            runner,
            tool: config.tools.tune2fs.clone(),
            span: tracing::debug_span!("tune2fs"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Every superblock field `tune2fs -l` reports for `device_path`.
    pub fn info(&self, device_path: &str) -> Result<AttributeMap> {
        let _enter = self.span.enter();

        let command_line = format!("{} -l {}", self.tool, device_path);
        let output = run_tool(self.runner.as_ref(), &self.tool, &command_line)?;
        if !output.success() {
            return Err(BlkcryptError::Tune2fs(output.stderr.trim().to_string()));
        }

        Ok(parse_tune2fs_output(&output.stdout))
    }

    /// A single field, or `None` when `tune2fs` does not report it.
    pub fn attribute(&self, device_path: &str, key: &str) -> Result<Option<String>> {
        Ok(self.info(device_path)?.remove(key))
    }

    pub fn last_mountpoint(&self, device_path: &str) -> Result<Option<String>> {
        self.attribute(device_path, LAST_MOUNTED_ON)
    }
}

/// Split each line on its first colon. The value is trimmed but the key is
/// kept exactly as printed, so lookups must use `tune2fs`'s own spelling.
/// Lines without a colon (the version banner) are dropped.
pub fn parse_tune2fs_output(stdout: &str) -> AttributeMap {
    stdout
        .trim()
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.to_string(), value.trim().to_string()))
        .collect()
}
