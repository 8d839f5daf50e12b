//! Mock GDB binary for integration testing
//!
//! Speaks just enough GDB/MI (`--interpreter=mi`) and console output
//! (`-q <target> -ex <cmd>...`) to exercise sessions without a real
//! debugger. The fake program has one function, `schedule` in `/p/a.c`:
//!
//! | pc         | line |
//! |------------|------|
//! | 0x80000010 | 44   |
//! | 0x80000024 | 49   |
//! | 0x80000030 | 49   |
//! | 0x80000090 | 69   |
//!
//! `0x80000000` is `_start`, which has no debug information. Addresses from
//! `0xffff0000` up are unmapped memory.
//!
//! Fault injection (MI mode): `-mock-hang` never answers, `-mock-exit` dies
//! mid-command, `-mock-stderr` writes to stderr before answering,
//! `-mock-stderr-hang` writes to stderr and never answers, and
//! `-mock-trickle` answers one byte at a time. In batch mode `-ex -mock-hang`
//! blocks until killed.

use std::io::{BufRead, Write};
use std::time::Duration;

const SOURCE_FILE: &str = "/p/a.c";
const LINE_TABLE: &[(u64, u32)] = &[
    (0x8000_0010, 44),
    (0x8000_0024, 49),
    (0x8000_0030, 49),
    (0x8000_0090, 69),
];
const NO_DEBUG_PC: u64 = 0x8000_0000;
const UNMAPPED_START: u64 = 0xffff_0000;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--interpreter=mi") {
        run_mi();
    } else {
        run_batch(&args);
    }
}

fn parse_hex(s: &str) -> Option<u64> {
    let digits = s.trim().trim_start_matches("0x");
    u64::from_str_radix(digits, 16).ok()
}

fn line_for_pc(pc: u64) -> Option<u32> {
    LINE_TABLE.iter().find(|(p, _)| *p == pc).map(|(_, l)| *l)
}

// ---------------------------------------------------------------- MI mode

fn run_mi() {
    let stdin = std::io::stdin();
    let mut out = std::io::stdout();

    let _ = write!(
        out,
        "=thread-group-added,id=\"i1\"\n~\"GNU gdb (mock) 14.2\\n\"\n(gdb) \n"
    );
    let _ = out.flush();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let command = line.trim();
        if command.is_empty() {
            continue;
        }

        match command {
            "quit" | "-gdb-exit" => {
                let _ = writeln!(out, "^exit");
                let _ = out.flush();
                return;
            }
            "-mock-hang" => continue,
            "-mock-exit" => std::process::exit(3),
            "-mock-stderr" => {
                eprintln!("warning: mock chatter on stderr");
                std::thread::sleep(Duration::from_millis(50));
                respond(&mut out, "^done,value=\"ok\"");
            }
            "-mock-stderr-hang" => {
                eprintln!("warning: mock chatter on stderr");
            }
            "-mock-trickle" => {
                let record = disassemble_record(0x8000_0090);
                for byte in format!("{}\n(gdb) \n", record).bytes() {
                    let _ = out.write_all(&[byte]);
                    let _ = out.flush();
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
            _ => {
                let record = mi_record(command);
                respond(&mut out, &record);
            }
        }
    }
}

fn respond<W: Write>(out: &mut W, record: &str) {
    let _ = write!(out, "{}\n(gdb) \n", record);
    let _ = out.flush();
}

fn mi_record(command: &str) -> String {
    if let Some(rest) = command.strip_prefix("-data-disassemble -s ") {
        return match rest.split_whitespace().next().and_then(parse_hex) {
            Some(pc) => disassemble_record(pc),
            None => "^error,msg=\"-data-disassemble: Usage: -s start -e end\"".to_string(),
        };
    }

    if let Some(file) = command.strip_prefix("-symbol-list-lines ") {
        if file.trim_matches('"') != SOURCE_FILE {
            return "^error,msg=\"-symbol-list-lines: Unknown source file name.\"".to_string();
        }
        let entries: Vec<String> = LINE_TABLE
            .iter()
            .map(|(pc, line)| format!("{{pc=\"{:#x}\",line=\"{}\"}}", pc, line))
            .collect();
        return format!("^done,lines=[{}]", entries.join(","));
    }

    format!(
        "^error,msg=\"Undefined MI command: {}\",code=\"undefined-command\"",
        command.trim_start_matches('-')
    )
}

fn disassemble_record(pc: u64) -> String {
    if pc == NO_DEBUG_PC {
        return format!(
            "^done,asm_insns=[{{address=\"{:#x}\",func-name=\"_start\",offset=\"0\",inst=\"li\\ts0,0\"}}]",
            pc
        );
    }

    if pc >= UNMAPPED_START {
        return format!("^error,msg=\"Cannot access memory at address {:#x}\"", pc);
    }

    match line_for_pc(pc) {
        Some(line) => format!(
            "^done,asm_insns=[src_and_asm_line={{line=\"{}\",file=\"a.c\",fullname=\"{}\",line_asm_insn=[{{address=\"{:#x}\",func-name=\"schedule\",offset=\"{}\",inst=\"auipc\\ta5,0x3\"}}]}}]",
            line,
            SOURCE_FILE,
            pc,
            pc - 0x8000_0010
        ),
        None => "^error,msg=\"No function contains specified address.\"".to_string(),
    }
}

// ------------------------------------------------------------- batch mode

fn run_batch(args: &[String]) {
    let mut out = std::io::stdout();
    let mut iter = args.iter();
    let mut target = None;
    let mut commands = Vec::new();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-q" => {}
            "-ex" => {
                if let Some(cmd) = iter.next() {
                    commands.push(cmd.clone());
                }
            }
            other => target = Some(other.to_string()),
        }
    }

    if let Some(target) = target {
        let _ = writeln!(out, "Reading symbols from {}...", target);
    }

    for command in commands {
        if command == "quit" {
            break;
        }
        if command == "-mock-hang" {
            let _ = out.flush();
            loop {
                std::thread::sleep(Duration::from_secs(60));
            }
        }
        let (stdout, stderr) = console_output(&command);
        let _ = out.write_all(stdout.as_bytes());
        if !stderr.is_empty() {
            eprint!("{}", stderr);
        }
    }
    let _ = out.flush();
}

fn console_output(command: &str) -> (String, String) {
    if let Some(addr) = command.strip_prefix("info symbol ") {
        return match parse_hex(addr) {
            Some(NO_DEBUG_PC) => ("_start in section .text\n".into(), String::new()),
            Some(pc) if line_for_pc(pc).is_some() => (
                format!("schedule + {} in section .text\n", pc - 0x8000_0010),
                String::new(),
            ),
            _ => (format!("No symbol matches {}.\n", addr), String::new()),
        };
    }

    if let Some(pattern) = command.strip_prefix("info functions ") {
        let mut text = format!("All functions matching regular expression \"{}\":\n", pattern);
        match pattern {
            "^schedule$" => text.push_str(&format!("\nFile {}:\n42:\tvoid schedule();\n", SOURCE_FILE)),
            "^_start$" => text.push_str("\nNon-debugging symbols:\n0x80000000  _start\n"),
            _ => {}
        }
        return (text, String::new());
    }

    if let Some(function) = command.strip_prefix("disassemble /s ") {
        if function != "schedule" {
            return (
                String::new(),
                format!("No symbol \"{}\" in current context.\n", function),
            );
        }
        let mut text = String::from("Dump of assembler code for function schedule:\n");
        text.push_str(&format!("{}:\n", SOURCE_FILE));
        for (pc, line) in LINE_TABLE {
            text.push_str(&format!("{}\t  /* line {} */\n", line, line));
            text.push_str(&format!(
                "   {:#x} <+{}>:\tnop\n",
                pc,
                pc - 0x8000_0010
            ));
        }
        text.push_str("End of assembler dump.\n");
        return (text, String::new());
    }

    if let Some(location) = command.strip_prefix("info line ") {
        let Some((file, line)) = location.rsplit_once(':') else {
            return (String::new(), "Function not found.\n".into());
        };
        if file != SOURCE_FILE {
            return (String::new(), format!("No source file named {}.\n", file));
        }
        let line: u32 = line.parse().unwrap_or(0);
        return match LINE_TABLE.iter().find(|(_, l)| *l == line) {
            Some((pc, _)) => (
                format!(
                    "Line {} of \"{}\" starts at address {:#x} <schedule+{}> and ends at {:#x} <schedule+{}>.\n",
                    line,
                    file,
                    pc,
                    pc - 0x8000_0010,
                    pc + 4,
                    pc + 4 - 0x8000_0010
                ),
                String::new(),
            ),
            None => (format!("No line {} in file \"{}\".\n", line, file), String::new()),
        };
    }

    (
        String::new(),
        format!("Undefined command: \"{}\".  Try \"help\".\n", command),
    )
}
