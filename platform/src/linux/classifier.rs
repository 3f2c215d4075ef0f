//! Decides which block devices may be handed to the encryption workflow.

use super::lsblk::Lsblk;
use super::run_tool;
use super::tune2fs::Tune2fs;
use blkcrypt_core::{
    is_valid_disk_type, is_valid_fstype, AttributeMap, BlkcryptError, CommandRunner, Config,
    DeviceIdentifier, Result, ValidDevice,
};
use std::sync::Arc;
use tracing::Span;

pub const BLOCK_COUNT: &str = "Block count";
pub const BLOCK_SIZE: &str = "Block size";
pub const FREE_BLOCKS: &str = "Free blocks";
pub const FILESYSTEM_UUID: &str = "Filesystem UUID";

/// Hostname the kernel reports before userspace has set one.
const PREBOOT_NODENAME: &str = "(none)";

pub struct DeviceClassifier {
    runner: Arc<dyn CommandRunner>,
    lsblk: Lsblk,
    tune2fs: Tune2fs,
    uname: String,
    boot_mountpoint: String,
    span: Span,
}

impl DeviceClassifier {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &Config) -> Self {
        Self {
            lsblk: Lsblk::new(runner.clone(), config),
            tune2fs: Tune2fs::new(runner.clone(), config),
            runner,
            uname: config.tools.uname.clone(),
            boot_mountpoint: config.boot_mountpoint.clone(),
            span: tracing::info_span!("classifier"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn lsblk(&self) -> &Lsblk {
        &self.lsblk
    }

    pub fn tune2fs(&self) -> &Tune2fs {
        &self.tune2fs
    }

    /// Guess the boot device: the first device whose last mount point is
    /// the boot mount point. Every enumerated device is checked.
    pub fn boot_device(&self) -> Result<Option<String>> {
        let _enter = self.span.enter();

        for device_path in self.lsblk.devices(DeviceIdentifier::Name)? {
            let last_mountpoint = self.last_mountpoint(&device_path)?;
            if last_mountpoint.as_deref() == Some(self.boot_mountpoint.as_str()) {
                tracing::info!(device = %device_path, "boot device found");
                return Ok(Some(device_path));
            }
        }

        tracing::debug!("no boot device found");
        Ok(None)
    }

    /// Paths of the devices eligible for encryption or decryption.
    pub fn valid_devices(&self) -> Result<Vec<String>> {
        Ok(self
            .valid_device_report()?
            .into_iter()
            .map(|device| device.path)
            .collect())
    }

    /// Like [`DeviceClassifier::valid_devices`], keeping the attributes each
    /// decision was based on.
    pub fn valid_device_report(&self) -> Result<Vec<ValidDevice>> {
        let boot_device = self.boot_device()?;
        let _enter = self.span.enter();

        let mut valid = Vec::new();
        for device_path in self.lsblk.devices(DeviceIdentifier::Name)? {
            let info = self.lsblk.info(&device_path)?;
            let disk_type = field(&info, "TYPE");
            let fstype = field(&info, "FSTYPE");

            if !is_valid_disk_type(&disk_type) {
                tracing::debug!(device = %device_path, %disk_type, "skipping: disk type");
                continue;
            }
            if !is_valid_fstype(&fstype) {
                tracing::debug!(device = %device_path, %fstype, "skipping: filesystem type");
                continue;
            }
            if boot_device.as_deref() == Some(device_path.as_str()) {
                tracing::debug!(device = %device_path, "skipping: boot device");
                continue;
            }

            let last_mountpoint = self.last_mountpoint(&device_path)?;
            valid.push(ValidDevice {
                path: device_path,
                disk_type,
                fstype,
                last_mountpoint,
            });
        }

        Ok(valid)
    }

    /// Whether the host looks like it is still in an initramfs: either the
    /// hostname query fails or the kernel reports `(none)`.
    pub fn is_preboot(&self) -> bool {
        let _enter = self.span.enter();

        let command_line = format!("{} -n", self.uname);
        match run_tool(self.runner.as_ref(), &self.uname, &command_line) {
            Ok(output) if output.success() => output.stdout.trim() == PREBOOT_NODENAME,
            Ok(output) => {
                tracing::debug!(code = output.code, "hostname query failed");
                true
            }
            Err(e) => {
                tracing::debug!("hostname query failed: {}", e);
                true
            }
        }
    }

    /// Filesystem size in bytes (block count × block size).
    pub fn size(&self, device_path: &str) -> Result<Option<u64>> {
        let info = self.tune2fs.info(device_path)?;
        Ok(product(&info, BLOCK_COUNT, BLOCK_SIZE))
    }

    pub fn free_blocks(&self, device_path: &str) -> Result<Option<u64>> {
        let info = self.tune2fs.info(device_path)?;
        Ok(number(&info, FREE_BLOCKS))
    }

    /// Free space in bytes (free blocks × block size).
    pub fn free_size(&self, device_path: &str) -> Result<Option<u64>> {
        let info = self.tune2fs.info(device_path)?;
        Ok(product(&info, FREE_BLOCKS, BLOCK_SIZE))
    }

    pub fn uuid(&self, device_path: &str) -> Result<Option<String>> {
        self.tune2fs.attribute(device_path, FILESYSTEM_UUID)
    }

    // Swap, LUKS containers and whole disks have no ext superblock, so a
    // tune2fs failure here just means "no last mount point".
    fn last_mountpoint(&self, device_path: &str) -> Result<Option<String>> {
        match self.tune2fs.last_mountpoint(device_path) {
            Err(BlkcryptError::Tune2fs(msg)) => {
                tracing::debug!(device = %device_path, "no ext metadata: {}", msg);
                Ok(None)
            }
            other => other,
        }
    }
}

fn field(info: &AttributeMap, key: &str) -> String {
    info.get(key).cloned().unwrap_or_default()
}

fn number(info: &AttributeMap, key: &str) -> Option<u64> {
    info.get(key)?.trim().parse().ok()
}

fn product(info: &AttributeMap, a: &str, b: &str) -> Option<u64> {
    number(info, a)?.checked_mul(number(info, b)?)
}
