//! Line-oriented bridge for editor integrations
//!
//! An editor plugin connects over a local socket (or stdio), starts a session
//! with `init gdb <path>`, then asks for highlights and breakpoint addresses.

pub mod handler;
pub mod protocol;
pub mod server;
pub mod transport;

pub use handler::Handler;
pub use protocol::{BridgeCommand, Reply};
pub use server::{serve_connection, Bridge};
