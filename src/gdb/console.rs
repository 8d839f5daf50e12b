//! Parsing of GDB's human-oriented console output
//!
//! Batch runs print a banner (`Reading symbols from ...`) ahead of the command
//! output, so every rule here scans lines instead of assuming positions.

use super::types::Address;
use crate::common::{Error, Result};

fn is_banner(line: &str) -> bool {
    line.starts_with("Reading symbols from") || line.starts_with("(No debugging symbols found")
}

fn content_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty() && !is_banner(l))
}

/// Function name from `info symbol <addr>`
///
/// `schedule + 16 in section .text` gives `schedule`; `No symbol matches`
/// means the address is not inside any known symbol.
pub fn parse_info_symbol(text: &str) -> Result<Option<String>> {
    for line in content_lines(text) {
        if line.starts_with("No symbol matches") {
            return Ok(None);
        }
        if line.contains(" in section ") {
            return Ok(line.split_whitespace().next().map(str::to_string));
        }
    }

    Err(Error::parse_failure(
        "info symbol",
        format!("no symbol line in {:?}", text.trim()),
    ))
}

/// Defining source file from `info functions ^name$`
///
/// ```text
/// All functions matching regular expression "^main$":
///
/// File /p/a.c:
/// 13:	int main();
/// ```
/// A match listed only under `Non-debugging symbols:` yields `None`.
pub fn parse_function_file(text: &str) -> Result<Option<String>> {
    let mut saw_header = false;
    for line in content_lines(text) {
        if let Some(rest) = line.strip_prefix("File ") {
            let path = rest.trim_end().strip_suffix(':').unwrap_or(rest.trim_end());
            if path.is_empty() {
                return Err(Error::parse_failure("info functions", "empty File line"));
            }
            return Ok(Some(path.to_string()));
        }
        if line.starts_with("All functions matching") || line.starts_with("All defined functions")
        {
            saw_header = true;
        }
    }

    if saw_header {
        Ok(None)
    } else {
        Err(Error::parse_failure(
            "info functions",
            format!("no function listing in {:?}", text.trim()),
        ))
    }
}

/// Source line of `pc` in a `disassemble /s` listing
///
/// Source lines start with their line number; instruction lines start with
/// an address (after an optional `=>` marker). The answer is the last source
/// line seen before the instruction at exactly `pc`.
pub fn parse_disassembly_line(text: &str, pc: Address) -> Result<Option<u32>> {
    if !text.contains("Dump of assembler code") {
        if text.contains("No function contains") {
            return Ok(None);
        }
        return Err(Error::parse_failure(
            "disassemble /s",
            format!("no assembler dump in {:?}", text.trim()),
        ));
    }

    let mut current_line: Option<u32> = None;
    for line in text.lines() {
        if let Some(number) = leading_number(line) {
            current_line = Some(number);
            continue;
        }
        if instruction_address(line) == Some(pc) {
            return Ok(current_line);
        }
    }

    Ok(None)
}

/// First instruction of `file:line` from `info line file:line`
///
/// ```text
/// Line 49 of "/p/a.c" starts at address 0x80000024 <main+20> and ends at 0x80000030 <main+32>.
/// Line 48 of "/p/a.c" is at address 0x80000024 <main+20> but contains no code.
/// No line 200 in file "/p/a.c".
/// ```
pub fn parse_info_line(text: &str) -> Result<Option<Address>> {
    for line in content_lines(text) {
        if line.starts_with("No line ") || line.starts_with("No source file named") {
            return Ok(None);
        }
        if !line.starts_with("Line ") {
            continue;
        }
        if line.contains("but contains no code") {
            return Ok(None);
        }
        if let Some((_, rest)) = line.split_once("starts at address ") {
            let token = rest.split_whitespace().next().unwrap_or_default();
            let address = token.trim_end_matches('.').parse().map_err(|_| {
                Error::parse_failure("info line", format!("bad address {:?}", token))
            })?;
            return Ok(Some(address));
        }
    }

    Err(Error::parse_failure(
        "info line",
        format!("no line information in {:?}", text.trim()),
    ))
}

/// Line number at the start of a source line (`69\t  current = ...`)
fn leading_number(line: &str) -> Option<u32> {
    let digits: &str = &line[..line.bytes().take_while(u8::is_ascii_digit).count()];
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Address of an instruction line (`   0x80000090 <+16>:\tauipc ...`)
fn instruction_address(line: &str) -> Option<Address> {
    let mut tokens = line.split_whitespace();
    let mut first = tokens.next()?;
    if first == "=>" {
        first = tokens.next()?;
    }
    if !first.starts_with("0x") {
        return None;
    }
    first.trim_end_matches(':').parse().ok()
}
