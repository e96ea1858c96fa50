use coda_core::{get_coda_dir, ConfigResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const RUNTIME_DIR_NAME: &str = "runtime";
const ASK_SOCKET_FILE_NAME: &str = "ask.sock";

/// Well-known ask socket location: `~/.coda/runtime/ask.sock`.
pub fn resolve_ask_socket_path() -> ConfigResult<PathBuf> {
    Ok(get_coda_dir()?
        .join(RUNTIME_DIR_NAME)
        .join(ASK_SOCKET_FILE_NAME))
}

/// Creates the socket's parent directory and removes a stale socket file.
pub fn prepare_socket_path(socket_path: &Path) -> io::Result<()> {
    if let Some(parent) = socket_path.parent() {
        fs::create_dir_all(parent)?;
    }

    if socket_path.exists() {
        fs::remove_file(socket_path)?;
    }

    Ok(())
}
