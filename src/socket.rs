//! Unix socket lifecycle

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::net::UnixListener;

use crate::error::Result;

/// Owns the socket file; the file is removed when the guard is dropped
#[derive(Debug)]
pub struct SocketGuard {
    path: PathBuf,
}

impl SocketGuard {
    /// Bind a listener at `path`, replacing a stale socket file, and apply
    /// the permission bits in `mode`
    pub fn bind<P: AsRef<Path>>(path: P, mode: u32) -> Result<(Self, UnixListener)> {
        let path = path.as_ref();
        if fs::symlink_metadata(path).is_ok() {
            log::debug!("Removing stale socket {}", path.display());
            fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;
        let guard = Self {
            path: path.to_path_buf(),
        };
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;

        Ok((guard, listener))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove socket {}: {}", self.path.display(), e);
            }
        }
    }
}
