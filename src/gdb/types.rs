//! Value types shared by the protocol layer and the resolver

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::common::{Error, Result};

/// A program-counter address
///
/// Displays as lowercase `0x`-prefixed hex with no padding. Parsing accepts
/// the same form, or bare hex as sent by clients (`80000000`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub u64);

impl Address {
    pub fn value(self) -> u64 {
        self.0
    }

    /// The address `bytes` further on, if it does not overflow
    pub fn offset(self, bytes: u64) -> Option<Address> {
        self.0.checked_add(bytes).map(Address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidAddress(s.to_string()));
        }

        u64::from_str_radix(digits, 16)
            .map(Address)
            .map_err(|_| Error::InvalidAddress(s.to_string()))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A resolved source position. Lines are 1-based, as GDB reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One row of a source file's line table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAddress {
    pub address: Address,
    pub line: u32,
}

/// Request to map a program counter to its source position
#[derive(Debug)]
pub struct AddressQuery {
    pc: Address,
}

impl AddressQuery {
    pub fn new(pc: Address) -> Self {
        Self { pc }
    }

    pub fn pc(&self) -> Address {
        self.pc
    }
}

/// Request to map a source line to the first instruction generated for it
#[derive(Debug)]
pub struct LineQuery {
    file: String,
    line: u32,
}

impl LineQuery {
    pub fn new(file: impl Into<String>, line: u32) -> Result<Self> {
        let file = file.into();
        if line == 0 {
            return Err(Error::InvalidLine(format!(
                "{}:0 (lines start at 1)",
                file
            )));
        }
        if file.trim().is_empty() {
            return Err(Error::InvalidLine("empty file path".to_string()));
        }
        Ok(Self { file, line })
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

/// Which output dialect a command is answered in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// GDB/MI result records (`^done,key="value",...`)
    Structured,
    /// Human-oriented console text
    CliText,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured => write!(f, "structured"),
            Self::CliText => write!(f, "cli-text"),
        }
    }
}

/// How a frame ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// `^done` result record
    Done,
    /// `^error` result record
    Error,
    /// Batch process exited; the whole output is the frame
    Exited,
}

/// One command's complete response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub status: FrameStatus,
    /// Response text with the result-class token and trailing prompt removed
    pub body: String,
    /// Anything the debugger wrote to stderr while this command was pending
    pub diagnostics: String,
}

impl Frame {
    pub fn new(status: FrameStatus, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            diagnostics: String::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == FrameStatus::Error
    }

    /// Message carried by an `^error` record (`msg="..."`)
    pub fn error_message(&self) -> String {
        super::mi::error_message(&self.body).unwrap_or_else(|| self.body.trim().to_string())
    }

    /// Turn an error frame into `Error::CommandFailed`
    pub fn into_result(self, command: &str) -> Result<Frame> {
        if !self.is_error() {
            return Ok(self);
        }

        let mut message = self.error_message();
        if !self.diagnostics.trim().is_empty() {
            message.push_str(" (stderr: ");
            message.push_str(self.diagnostics.trim());
            message.push(')');
        }
        Err(Error::command_failed(command, &message))
    }
}
