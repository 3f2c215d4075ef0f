pub mod classifier;
pub mod dd;
pub mod lsblk;
pub mod privilege;
pub mod tune2fs;

pub use classifier::DeviceClassifier;
pub use dd::DiskDump;
pub use lsblk::{is_block_device, parse_pairs, Listing, Lsblk, LSBLK_FIELDS};
pub use privilege::ensure_root;
pub use tune2fs::{parse_tune2fs_output, Tune2fs};

use blkcrypt_core::{BlkcryptError, CommandOutput, CommandRunner, Result};
use std::io;

/// Run a tool, reporting a missing binary as [`BlkcryptError::ToolNotFound`].
pub(crate) fn run_tool(
    runner: &dyn CommandRunner,
    tool: &str,
    command_line: &str,
) -> Result<CommandOutput> {
    runner.run(command_line, None).map_err(|e| match e {
        BlkcryptError::IoError(err) if err.kind() == io::ErrorKind::NotFound => {
            BlkcryptError::ToolNotFound(tool.to_string())
        }
        other => other,
    })
}
