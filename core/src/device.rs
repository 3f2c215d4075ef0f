use crate::BlkcryptError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Attribute name to value, as scraped from a tool's output.
pub type AttributeMap = BTreeMap<String, String>;

/// Disk types eligible for encryption (lsblk `TYPE`).
pub const VALID_DISK_TYPES: [&str; 3] = ["part", "lvm", "crypt"];

/// Filesystem types eligible for encryption (lsblk `FSTYPE`).
pub const VALID_FSTYPES: [&str; 4] = ["ext2", "ext3", "ext4", "swap"];

/// Column used to enumerate every block device on the host.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DeviceIdentifier {
    #[default]
    Name,
    Label,
    Uuid,
    Kname,
}

impl DeviceIdentifier {
    pub const ALL: [DeviceIdentifier; 4] = [
        DeviceIdentifier::Name,
        DeviceIdentifier::Label,
        DeviceIdentifier::Uuid,
        DeviceIdentifier::Kname,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceIdentifier::Name => "NAME",
            DeviceIdentifier::Label => "LABEL",
            DeviceIdentifier::Uuid => "UUID",
            DeviceIdentifier::Kname => "KNAME",
        }
    }
}

impl fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceIdentifier {
    type Err = BlkcryptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NAME" => Ok(DeviceIdentifier::Name),
            "LABEL" => Ok(DeviceIdentifier::Label),
            "UUID" => Ok(DeviceIdentifier::Uuid),
            "KNAME" => Ok(DeviceIdentifier::Kname),
            other => Err(BlkcryptError::InvalidIdentifier(other.to_string())),
        }
    }
}

/// A device that passed classification, with the attributes used to decide.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidDevice {
    pub path: String,
    pub disk_type: String,
    pub fstype: String,
    pub last_mountpoint: Option<String>,
}

pub fn is_valid_disk_type(disk_type: &str) -> bool {
    VALID_DISK_TYPES.contains(&disk_type)
}

pub fn is_valid_fstype(fstype: &str) -> bool {
    VALID_FSTYPES.contains(&fstype)
}
