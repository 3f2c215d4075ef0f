#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "linux")]
pub use linux::{
    ensure_root, is_block_device, parse_pairs, parse_tune2fs_output, DeviceClassifier, DiskDump,
    Listing, Lsblk, Tune2fs, LSBLK_FIELDS,
};
