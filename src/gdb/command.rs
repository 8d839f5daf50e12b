//! Debugger command strings issued by the resolver

use super::mi::quote_arg;
use super::types::Address;

/// Source-interleaved disassembly of `[start, end)` (MI mode 4)
pub fn mi_disassemble(start: Address, end: Address) -> String {
    format!("-data-disassemble -s {} -e {} -- 4", start, end)
}

/// Every `(pc, line)` pair of a source file
pub fn mi_symbol_list_lines(file: &str) -> String {
    format!("-symbol-list-lines {}", quote_arg(file))
}

pub fn info_symbol(pc: Address) -> String {
    format!("info symbol {}", pc)
}

/// Definitions of exactly `name` (the argument is a regex)
pub fn info_functions(name: &str) -> String {
    format!("info functions ^{}$", regex_escape(name))
}

pub fn disassemble_source(function: &str) -> String {
    format!("disassemble /s {}", function)
}

pub fn info_line(file: &str, line: u32) -> String {
    format!("info line {}:{}", file, line)
}

/// Graceful exit, understood in both dialects
pub const QUIT: &str = "quit";

fn regex_escape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if matches!(
            c,
            '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_commands() {
        assert_eq!(
            mi_disassemble(Address(0x8000_0090), Address(0x8000_0094)),
            "-data-disassemble -s 0x80000090 -e 0x80000094 -- 4"
        );
        assert_eq!(mi_symbol_list_lines("/p/a.c"), "-symbol-list-lines /p/a.c");
        assert_eq!(
            mi_symbol_list_lines("/p q/a.c"),
            "-symbol-list-lines \"/p q/a.c\""
        );
    }

    #[test]
    fn test_console_commands() {
        assert_eq!(info_symbol(Address(0x10)), "info symbol 0x10");
        assert_eq!(info_functions("main"), "info functions ^main$");
        assert_eq!(
            info_functions("operator()"),
            "info functions ^operator\\(\\)$"
        );
        assert_eq!(disassemble_source("main"), "disassemble /s main");
        assert_eq!(info_line("/p/a.c", 49), "info line /p/a.c:49");
    }
}
