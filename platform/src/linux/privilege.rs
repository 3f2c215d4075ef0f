use blkcrypt_core::{BlkcryptError, Result};

/// Fail unless the effective user is root.
pub fn ensure_root() -> Result<()> {
    if nix::unistd::geteuid().is_root() {
        return Ok(());
    }
    Err(BlkcryptError::InsufficientPrivileges(
        "Must run as root".to_string(),
    ))
}
