//! Socket file locations

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const SOCKET_ENV: &str = "CRUCIBLE_RPC_SOCKET";
const SOCKET_NAME: &str = "crucible-rpc.sock";

/// Default endpoint: `$CRUCIBLE_RPC_SOCKET`, else the user runtime directory
/// (`$XDG_RUNTIME_DIR`), else `/tmp`.
pub fn socket_path() -> PathBuf {
    match std::env::var_os(SOCKET_ENV) {
        Some(path) => PathBuf::from(path),
        None => dirs::runtime_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(SOCKET_NAME),
    }
}

/// Make `path` bindable: clear a leftover socket file and create any missing
/// parent directories.
pub(crate) fn prepare_socket(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => debug!(?path, "Removed stale socket"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Remove a socket file after use. A file that is already gone is fine.
pub fn remove_socket(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(?path, "Failed to remove socket: {}", e);
        }
    }
}
