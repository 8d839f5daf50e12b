//! Cross-platform local socket transport
//!
//! Abstracts Unix domain sockets (Unix/macOS) and named pipes (Windows)
//! using the interprocess crate.

use std::io;

#[cfg(unix)]
pub mod platform {
    pub use interprocess::local_socket::tokio::{prelude::*, Listener, Stream};
    pub use interprocess::local_socket::{GenericFilePath, ListenerOptions};
}

#[cfg(windows)]
pub mod platform {
    pub use interprocess::local_socket::tokio::{prelude::*, Listener, Stream};
    pub use interprocess::local_socket::{GenericNamespaced, ListenerOptions};
}

use platform::*;

pub use platform::{Listener, Stream};

use crate::common::paths;

/// Create a listener on `name`, replacing any stale socket
pub fn create_listener(name: &str) -> io::Result<Listener> {
    #[cfg(unix)]
    let listener = {
        let path = std::path::Path::new(name);
        paths::ensure_socket_dir(path)?;
        paths::remove_socket(path)?;

        let fs_name = name.to_fs_name::<GenericFilePath>()?;
        let listener = ListenerOptions::new().name(fs_name).create_tokio()?;

        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        listener
    };

    #[cfg(windows)]
    let listener = {
        let ns_name = name.to_ns_name::<GenericNamespaced>()?;
        ListenerOptions::new().name(ns_name).create_tokio()?
    };

    Ok(listener)
}

/// Connect to a bridge listening on `name`
pub async fn connect(name: &str) -> io::Result<Stream> {
    #[cfg(unix)]
    let stream = {
        let fs_name = name.to_fs_name::<GenericFilePath>()?;
        Stream::connect(fs_name).await?
    };

    #[cfg(windows)]
    let stream = {
        let ns_name = name.to_ns_name::<GenericNamespaced>()?;
        Stream::connect(ns_name).await?
    };

    Ok(stream)
}

/// Remove the socket file after the listener is gone
pub fn cleanup(name: &str) -> io::Result<()> {
    paths::remove_socket(std::path::Path::new(name))
}
