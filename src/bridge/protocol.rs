//! Bridge wire protocol
//!
//! Requests are single text lines (`init gdb <path>`, `hl src <addr>`,
//! `bp <file> <line>`). Each reply is one JSON object on its own line, tagged
//! by `type`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::common::error::BridgeError;
use crate::gdb::{Address, SourceLocation};

/// Which view a highlight request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightScope {
    /// Source view only
    Source,
    /// Every view; the bridge answers the source part
    All,
    /// Disassembly view, owned by the editor
    Disassembly,
}

/// One parsed request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCommand {
    /// Start (or replace) the debugger session for a target
    InitGdb { target: PathBuf },
    /// Open a disassembly view; handled by the editor, not the bridge
    InitDisassembly { target: PathBuf },
    /// Resolve a program counter for highlighting
    Highlight { scope: HighlightScope, pc: Address },
    /// Resolve a source line to a breakpoint address
    Breakpoint { file: String, line: u32 },
}

impl BridgeCommand {
    /// Parse one request line
    pub fn parse(line: &str) -> Result<Self, BridgeError> {
        let line = line.trim();
        let (verb, rest) = split_word(line);

        match verb {
            "init" => {
                let (kind, path) = split_word(rest);
                if path.is_empty() {
                    return Err(invalid(format!("missing target path in '{}'", line)));
                }
                let target = PathBuf::from(path);
                match kind {
                    "gdb" => Ok(Self::InitGdb { target }),
                    "disas" => Ok(Self::InitDisassembly { target }),
                    _ => Err(invalid(format!("unknown init kind '{}'", kind))),
                }
            }
            "hl" => {
                let (scope, addr) = split_word(rest);
                let scope = match scope {
                    "src" => HighlightScope::Source,
                    "all" => HighlightScope::All,
                    "disas" => HighlightScope::Disassembly,
                    _ => return Err(invalid(format!("unknown highlight scope '{}'", scope))),
                };
                let pc = addr
                    .parse::<Address>()
                    .map_err(|e| BridgeError::from(&e))?;
                Ok(Self::Highlight { scope, pc })
            }
            "bp" => {
                // File names may contain spaces; the line is always the last word
                let (file, line_no) = rest
                    .rsplit_once(char::is_whitespace)
                    .ok_or_else(|| invalid(format!("expected 'bp <file> <line>', got '{}'", line)))?;
                let line_no = line_no
                    .parse::<u32>()
                    .map_err(|_| invalid(format!("invalid line number '{}'", line_no)))?;
                Ok(Self::Breakpoint {
                    file: file.trim().to_string(),
                    line: line_no,
                })
            }
            "" => Err(invalid("empty request")),
            _ => Err(invalid(format!("unknown command '{}'", verb))),
        }
    }
}

fn split_word(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

fn invalid(message: impl Into<String>) -> BridgeError {
    BridgeError::new("INVALID_REQUEST", message)
}

/// One reply line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Ready {
        target: String,
    },
    Location {
        pc: Address,
        file: Option<String>,
        line: Option<u32>,
    },
    Breakpoint {
        file: String,
        line: u32,
        pc: Option<Address>,
    },
    Error(BridgeError),
}

impl Reply {
    pub fn location(pc: Address, location: Option<SourceLocation>) -> Self {
        match location {
            Some(SourceLocation { file, line }) => Self::Location {
                pc,
                file: Some(file),
                line: Some(line),
            },
            None => Self::Location {
                pc,
                file: None,
                line: None,
            },
        }
    }

    /// Encode as a single JSON line, without the trailing newline
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<BridgeError> for Reply {
    fn from(e: BridgeError) -> Self {
        Self::Error(e)
    }
}
