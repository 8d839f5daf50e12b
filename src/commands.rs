//! CLI command definitions
//!
//! Defines the clap commands for the srcmap CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a program counter to file:line
    Resolve {
        /// Binary with debug information
        target: PathBuf,

        /// Address to resolve (hex, with or without 0x)
        pc: String,

        #[command(flatten)]
        debugger: DebuggerArgs,
    },

    /// Find the first instruction generated for a source line
    #[command(alias = "bp")]
    Breakpoint {
        /// Binary with debug information
        target: PathBuf,

        /// Source file as recorded in the debug information
        file: String,

        /// Line number (1-based)
        line: u32,

        #[command(flatten)]
        debugger: DebuggerArgs,
    },

    /// Run the editor bridge
    Serve {
        /// Serve a single client on stdin/stdout instead of the local socket
        #[arg(long)]
        stdio: bool,

        #[command(flatten)]
        debugger: DebuggerArgs,
    },

    /// Show the configuration file and the debugger that would be used
    Config,
}

/// Per-invocation overrides of the `[gdb]` and `[timeouts]` configuration
#[derive(Args, Debug, Default, Clone)]
pub struct DebuggerArgs {
    /// Debugger executable (name in PATH or a path)
    #[arg(long)]
    pub gdb: Option<String>,

    /// Start a fresh debugger per command instead of one MI session
    #[arg(long)]
    pub batch: bool,

    /// Per-command timeout in seconds (0 disables it)
    #[arg(long)]
    pub timeout: Option<u64>,
}
