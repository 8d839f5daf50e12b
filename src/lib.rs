//! srcmap - source/address mapping on top of GDB
//!
//! This library drives a GDB process (GDB/MI, or one-shot console runs) and
//! answers two questions about a binary: which source line a program counter
//! belongs to, and which address a breakpoint on a source line should use.

pub mod bridge;
pub mod cli;
pub mod commands;
pub mod common;
pub mod gdb;
pub mod resolver;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use gdb::{Address, Session, SessionOptions, SourceLocation};
pub use resolver::{Debugger, Resolver};
