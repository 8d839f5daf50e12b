//! Cross-platform socket and configuration paths
//!
//! Unix/macOS: the bridge socket lives under $XDG_RUNTIME_DIR or /tmp
//! Windows: named pipe \\.\pipe\gdb-srcmap-<username>

use std::io;
use std::path::PathBuf;

/// Name used for the bridge socket/pipe and the project directories
const APP_NAME: &str = "gdb-srcmap";

/// Get the socket path for the bridge server
///
/// - Unix: `$XDG_RUNTIME_DIR/gdb-srcmap/bridge.sock` or `/tmp/gdb-srcmap-<uid>/bridge.sock`
/// - Windows: a pipe name (the interprocess crate adds the `\\.\pipe\` prefix)
#[cfg(unix)]
pub fn socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_NAME).join("bridge.sock");
    }

    // SAFETY: getuid has no preconditions and cannot fail
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/{}-{}", APP_NAME, uid)).join("bridge.sock")
}

#[cfg(windows)]
pub fn socket_path() -> PathBuf {
    let username = std::env::var("USERNAME").unwrap_or_else(|_| "default".to_string());
    PathBuf::from(format!("{}-{}", APP_NAME, username))
}

/// Socket name suitable for the interprocess local socket API
pub fn socket_name() -> String {
    socket_path().to_string_lossy().into_owned()
}

/// Ensure the socket directory exists, owner-only on Unix
#[cfg(unix)]
pub fn ensure_socket_dir(socket: &std::path::Path) -> io::Result<()> {
    let dir = socket
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Invalid socket path"))?;

    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(())
}

#[cfg(windows)]
pub fn ensure_socket_dir(_socket: &std::path::Path) -> io::Result<()> {
    Ok(())
}

/// Remove a stale socket file
#[cfg(unix)]
pub fn remove_socket(socket: &std::path::Path) -> io::Result<()> {
    if socket.exists() {
        std::fs::remove_file(socket)?;
    }
    Ok(())
}

#[cfg(windows)]
pub fn remove_socket(_socket: &std::path::Path) -> io::Result<()> {
    Ok(())
}

/// Get the configuration directory path
///
/// - Linux: `~/.config/gdb-srcmap/`
/// - macOS: `~/Library/Application Support/gdb-srcmap/`
/// - Windows: `%APPDATA%\gdb-srcmap\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("logs"))
}
