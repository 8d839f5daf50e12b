//! GDB/MI structured-record parsing
//!
//! MI payloads are nested `key="value"` results, `{...}` tuples and `[...]`
//! lists:
//! ```text
//! asm_insns=[src_and_asm_line={line="69",file="a.c",line_asm_insn=[{address="0x80000090"}]}]
//! ```
//! The first list in a payload is decoded into a `serde_json::Value`
//! (tuples become objects, a `key=value` list element becomes a one-key
//! object) and the fields we need are pulled out of that.

use serde_json::{Map, Value};

use super::types::{Address, LineAddress, SourceLocation};
use crate::common::{Error, Result};

/// Decode the first `[...]` list found in an MI payload
pub fn first_list(payload: &str) -> Result<Value> {
    let start = find_outside_strings(payload, b'[')
        .ok_or_else(|| Error::parse_failure("MI record", format!("no list in {:?}", payload)))?;
    let end = matching_close(payload, start)
        .ok_or_else(|| Error::parse_failure("MI record", "unterminated list"))?;

    let mut parser = Parser::new(&payload[start..=end]);
    let value = parser.value()?;
    parser.expect_end()?;
    Ok(value)
}

/// Decode a whole MI result list (`key=value,key=value`) into an object
pub fn parse_results(payload: &str) -> Result<Map<String, Value>> {
    let mut parser = Parser::new(payload.trim());
    let mut map = Map::new();
    if parser.at_end() {
        return Ok(map);
    }
    loop {
        let (key, value) = parser.result()?;
        map.insert(key, value);
        if !parser.eat(b',') {
            break;
        }
    }
    parser.expect_end()?;
    Ok(map)
}

/// `msg` field of an `^error` payload
pub fn error_message(payload: &str) -> Option<String> {
    parse_results(payload)
        .ok()?
        .get("msg")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Whether an `^error` message means there is no code at the address
pub fn is_unmapped_address_error(message: &str) -> bool {
    message.starts_with("Cannot access memory at address")
        || message.starts_with("No function contains")
}

/// Source location from a `-data-disassemble ... -- 4` payload
///
/// With line information every list element is a `src_and_asm_line`
/// record; without it the list holds bare instruction tuples. The latter is
/// the "no debug information" answer and yields `None`.
pub fn parse_disassembly_location(payload: &str) -> Result<Option<SourceLocation>> {
    let list = first_list(payload)?;
    let items = list
        .as_array()
        .ok_or_else(|| Error::parse_failure("disassembly", "asm_insns is not a list"))?;

    for item in items {
        let Some(record) = src_and_asm_record(item) else {
            continue;
        };

        let file = record
            .get("fullname")
            .or_else(|| record.get("file"))
            .and_then(Value::as_str);
        let line = record.get("line").and_then(Value::as_str);

        let (Some(file), Some(line)) = (file, line) else {
            return Err(Error::parse_failure(
                "disassembly",
                "src_and_asm_line without file/line",
            ));
        };
        let line: u32 = line
            .parse()
            .map_err(|_| Error::parse_failure("disassembly", format!("bad line {:?}", line)))?;

        if line == 0 {
            return Ok(None);
        }
        return Ok(Some(SourceLocation {
            file: file.to_string(),
            line,
        }));
    }

    Ok(None)
}

/// The `src_and_asm_line` record of a disassembly list element, if any
fn src_and_asm_record(item: &Value) -> Option<&Map<String, Value>> {
    let obj = item.as_object()?;
    if let Some(inner) = obj.get("src_and_asm_line") {
        return inner.as_object();
    }
    // Some GDB versions emit the records as bare tuples.
    if obj.contains_key("line_asm_insn") {
        return Some(obj);
    }
    None
}

/// Line table from a `-symbol-list-lines` payload, in emitted order
pub fn parse_line_table(payload: &str) -> Result<Vec<LineAddress>> {
    let list = first_list(payload)?;
    let items = list
        .as_array()
        .ok_or_else(|| Error::parse_failure("line table", "lines is not a list"))?;

    items
        .iter()
        .map(|item| {
            let pc = item.get("pc").and_then(Value::as_str);
            let line = item.get("line").and_then(Value::as_str);
            let (Some(pc), Some(line)) = (pc, line) else {
                return Err(Error::parse_failure(
                    "line table",
                    format!("entry without pc/line: {}", item),
                ));
            };
            Ok(LineAddress {
                address: pc.parse().map_err(|_| {
                    Error::parse_failure("line table", format!("bad pc {:?}", pc))
                })?,
                line: line.parse().map_err(|_| {
                    Error::parse_failure("line table", format!("bad line {:?}", line))
                })?,
            })
        })
        .collect()
}

/// Lowest address whose entry is for exactly `line`
///
/// GDB emits the table in address order, so this is also the first match.
pub fn lowest_address_for_line(table: &[LineAddress], line: u32) -> Option<Address> {
    table
        .iter()
        .filter(|entry| entry.line == line)
        .map(|entry| entry.address)
        .min()
}

/// Quote a string as an MI c-string when it needs it
pub fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\') {
        return arg.to_string();
    }

    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for c in arg.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn find_outside_strings(text: &str, target: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut in_string = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if in_string => i += 1,
            b'"' => in_string = !in_string,
            b if b == target && !in_string => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index of the bracket closing the one at `open`
fn matching_close(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if in_string => i += 1,
            b'"' => in_string = !in_string,
            b'[' | b'{' if !in_string => depth += 1,
            b']' | b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Recursive-descent reader for MI values
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, b: u8) -> Result<()> {
        if self.eat(b) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", b as char)))
        }
    }

    fn expect_end(&self) -> Result<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error("trailing input"))
        }
    }

    fn error(&self, what: &str) -> Error {
        let context: String = self.input[self.pos..].chars().take(24).collect();
        Error::parse_failure(
            "MI record",
            format!("{} at offset {} near {:?}", what, self.pos, context),
        )
    }

    fn value(&mut self) -> Result<Value> {
        match self.peek() {
            Some(b'"') => self.cstring().map(Value::String),
            Some(b'{') => self.tuple(),
            Some(b'[') => self.list(),
            _ => Err(self.error("expected a value")),
        }
    }

    fn result(&mut self) -> Result<(String, Value)> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b'=' {
                break;
            }
            if matches!(b, b',' | b'{' | b'}' | b'[' | b']' | b'"') {
                return Err(self.error("expected '=' after key"));
            }
            self.pos += 1;
        }
        let key = self.input[start..self.pos].to_string();
        if key.is_empty() {
            return Err(self.error("empty key"));
        }
        self.expect(b'=')?;
        Ok((key, self.value()?))
    }

    fn tuple(&mut self) -> Result<Value> {
        self.expect(b'{')?;
        let mut map = Map::new();
        if self.eat(b'}') {
            return Ok(Value::Object(map));
        }
        loop {
            let (key, value) = self.result()?;
            map.insert(key, value);
            if self.eat(b'}') {
                return Ok(Value::Object(map));
            }
            self.expect(b',')?;
        }
    }

    /// A list holds either plain values or `key=value` results
    fn list(&mut self) -> Result<Value> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        if self.eat(b']') {
            return Ok(Value::Array(items));
        }
        loop {
            let item = if matches!(self.peek(), Some(b'"' | b'{' | b'[')) {
                self.value()?
            } else {
                let (key, value) = self.result()?;
                let mut single = Map::new();
                single.insert(key, value);
                Value::Object(single)
            };
            items.push(item);
            if self.eat(b']') {
                return Ok(Value::Array(items));
            }
            self.expect(b',')?;
        }
    }

    fn cstring(&mut self) -> Result<String> {
        self.expect(b'"')?;
        let mut out = String::new();
        let mut chars = self.input[self.pos..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, other)) => out.push(other),
                    None => break,
                },
                c => out.push(c),
            }
        }
        Err(self.error("unterminated string"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disassembly_with_debug_info() {
        let payload = r#"asm_insns=[src_and_asm_line={line="69",file="/p/a.c",fullname="/p/a.c",line_asm_insn=[{address="0x80000090",func-name="schedule",offset="16",inst="auipc\ta5,0x3"}]}]"#;
        let loc = parse_disassembly_location(payload).unwrap().unwrap();
        assert_eq!(loc.file, "/p/a.c");
        assert_eq!(loc.line, 69);
    }

    #[test]
    fn test_disassembly_prefers_fullname() {
        let payload = r#"asm_insns=[src_and_asm_line={line="7",file="a.c",fullname="/home/u/a.c",line_asm_insn=[]}]"#;
        let loc = parse_disassembly_location(payload).unwrap().unwrap();
        assert_eq!(loc.file, "/home/u/a.c");
    }

    #[test]
    fn test_disassembly_without_debug_info_is_absent() {
        let payload = r#"asm_insns=[{address="0x80000000",func-name="_start",offset="0",inst="li\ts0,0"}]"#;
        assert_eq!(parse_disassembly_location(payload).unwrap(), None);
        assert_eq!(parse_disassembly_location("asm_insns=[]").unwrap(), None);
    }

    #[test]
    fn test_disassembly_garbage_is_parse_failure() {
        assert!(matches!(
            parse_disassembly_location("value=\"42\""),
            Err(Error::ParseFailure { .. })
        ));
        assert!(matches!(
            parse_disassembly_location("asm_insns=[src_and_asm_line={line=\"3\""),
            Err(Error::ParseFailure { .. })
        ));
        assert!(matches!(
            parse_disassembly_location("asm_insns=[src_and_asm_line={line=\"3\",line_asm_insn=[]}]"),
            Err(Error::ParseFailure { .. })
        ));
    }

    #[test]
    fn test_line_table_and_breakpoint_pick() {
        let table =
            parse_line_table(r#"[{pc="0x80000010",line="44"},{pc="0x80000024",line="49"}]"#)
                .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(lowest_address_for_line(&table, 49), Some(Address(0x8000_0024)));
        assert_eq!(lowest_address_for_line(&table, 45), None);
    }

    #[test]
    fn test_line_table_lowest_match_wins() {
        let table = parse_line_table(
            r#"lines=[{pc="0x80000010",line="44"},{pc="0x80000024",line="49"},{pc="0x80000030",line="49"}]"#,
        )
        .unwrap();
        assert_eq!(lowest_address_for_line(&table, 49), Some(Address(0x8000_0024)));

        let unordered = parse_line_table(
            r#"lines=[{pc="0x80000040",line="49"},{pc="0x80000024",line="49"}]"#,
        )
        .unwrap();
        assert_eq!(lowest_address_for_line(&unordered, 49), Some(Address(0x8000_0024)));
    }

    #[test]
    fn test_line_table_bad_entry() {
        assert!(parse_line_table(r#"[{pc="0x10"}]"#).is_err());
        assert!(parse_line_table(r#"[{pc="zz",line="1"}]"#).is_err());
    }

    #[test]
    fn test_strings_with_brackets_and_escapes() {
        let value = first_list(r#"x="[not this]",y=["a\"]b",{k="}"}]"#).unwrap();
        assert_eq!(value[0], "a\"]b");
        assert_eq!(value[1]["k"], "}");
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"msg="No symbol \"foo\" in current context.""#).as_deref(),
            Some("No symbol \"foo\" in current context.")
        );
        assert_eq!(error_message("garbage"), None);
    }

    #[test]
    fn test_unmapped_address_errors() {
        assert!(is_unmapped_address_error("Cannot access memory at address 0xffff0000"));
        assert!(is_unmapped_address_error("No function contains specified address."));
        assert!(!is_unmapped_address_error("-data-disassemble: Usage: -s start -e end"));
    }

    #[test]
    fn test_parse_results_nested() {
        let map = parse_results(r#"bkpt={number="1",addr="0x10"},extra=["1","2"]"#).unwrap();
        assert_eq!(map["bkpt"]["addr"], "0x10");
        assert_eq!(map["extra"][1], "2");
        assert!(parse_results("").unwrap().is_empty());
    }

    #[test]
    fn test_quote_arg() {
        assert_eq!(quote_arg("/p/a.c"), "/p/a.c");
        assert_eq!(quote_arg("/my dir/a.c"), "\"/my dir/a.c\"");
        assert_eq!(quote_arg(r"C:\src\a.c"), r#""C:\\src\\a.c""#);
    }
}
