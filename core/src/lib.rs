pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod shell;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use command::{CommandOutput, CommandRunner, SystemCommandRunner, ERROR_EXIT_CODE};
pub use config::{Config, ToolPaths};
pub use device::{
    is_valid_disk_type, is_valid_fstype, AttributeMap, DeviceIdentifier, ValidDevice,
    VALID_DISK_TYPES, VALID_FSTYPES,
};
pub use error::{BlkcryptError, Result};
