//! GDB session protocol layer
//!
//! Spawns and supervises the debugger, frames its output into per-command
//! responses, and parses both the GDB/MI and console dialects.

pub mod command;
pub mod console;
pub mod framer;
pub mod mi;
pub mod process;
pub mod session;
pub mod types;

pub use session::{Session, SessionOptions, SessionState, ShutdownHandle};
pub use types::*;
