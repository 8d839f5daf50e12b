//! Address ↔ source-line resolution
//!
//! Builds the two queries external tooling needs on top of a debugger
//! session. Which commands are issued depends on the session's dialect; the
//! results do not.

use async_trait::async_trait;

use crate::common::config::Config;
use crate::common::Result;
use crate::gdb::{
    command, console, mi, Address, AddressQuery, Dialect, Frame, LineQuery, Session,
    SourceLocation,
};

/// Something that runs debugger commands one at a time
#[async_trait]
pub trait Debugger: Send + Sync {
    /// Dialect the responses are written in
    fn dialect(&self) -> Dialect;

    /// Run one command and return its complete response
    async fn execute(&self, command: &str) -> Result<Frame>;
}

#[async_trait]
impl Debugger for Session {
    fn dialect(&self) -> Dialect {
        Session::dialect(self)
    }

    async fn execute(&self, command: &str) -> Result<Frame> {
        Session::execute(self, command).await
    }
}

/// Resolves program counters to source lines and source lines to addresses
#[derive(Debug, Clone)]
pub struct Resolver {
    /// Span of the one-instruction disassembly window
    instruction_width: u64,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Resolver {
    pub fn new(instruction_width: u64) -> Self {
        Self {
            instruction_width: instruction_width.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.gdb.instruction_width)
    }

    /// Source location of a program counter
    ///
    /// `Ok(None)` means the debugger has no line information for `pc`.
    #[tracing::instrument(skip_all, fields(pc = %query.pc(), dialect = %debugger.dialect()))]
    pub async fn resolve_address<D: Debugger + ?Sized>(
        &self,
        debugger: &D,
        query: AddressQuery,
    ) -> Result<Option<SourceLocation>> {
        let pc = query.pc();
        let location = match debugger.dialect() {
            Dialect::Structured => self.address_structured(debugger, pc).await?,
            Dialect::CliText => address_console(debugger, pc).await?,
        };

        match &location {
            Some(loc) => tracing::debug!(location = %loc, "Resolved address"),
            None => tracing::debug!("No debug information for address"),
        }
        Ok(location)
    }

    /// Address of the first instruction generated for a source line
    ///
    /// `Ok(None)` means no instruction maps to exactly that line.
    #[tracing::instrument(skip_all, fields(file = %query.file(), line = query.line(), dialect = %debugger.dialect()))]
    pub async fn resolve_breakpoint<D: Debugger + ?Sized>(
        &self,
        debugger: &D,
        query: LineQuery,
    ) -> Result<Option<Address>> {
        let address = match debugger.dialect() {
            Dialect::Structured => breakpoint_structured(debugger, &query).await?,
            Dialect::CliText => breakpoint_console(debugger, &query).await?,
        };

        match address {
            Some(pc) => tracing::debug!(%pc, "Resolved breakpoint"),
            None => tracing::debug!("No instruction for line"),
        }
        Ok(address)
    }

    async fn address_structured<D: Debugger + ?Sized>(
        &self,
        debugger: &D,
        pc: Address,
    ) -> Result<Option<SourceLocation>> {
        let end = pc.offset(self.instruction_width).ok_or_else(|| {
            crate::Error::InvalidAddress(format!("{} is at the end of the address space", pc))
        })?;

        let cmd = command::mi_disassemble(pc, end);
        let frame = debugger.execute(&cmd).await?;
        if frame.is_error() {
            let message = frame.error_message();
            if mi::is_unmapped_address_error(&message) {
                tracing::debug!(%pc, %message, "No code at address");
                return Ok(None);
            }
        }
        let frame = frame.into_result(&cmd)?;
        mi::parse_disassembly_location(&frame.body)
    }
}

/// `info symbol` → `info functions` → `disassemble /s`, each step feeding the next
async fn address_console<D: Debugger + ?Sized>(
    debugger: &D,
    pc: Address,
) -> Result<Option<SourceLocation>> {
    let cmd = command::info_symbol(pc);
    let frame = debugger.execute(&cmd).await?;
    let Some(function) = console::parse_info_symbol(&frame.body)? else {
        return Ok(None);
    };
    tracing::trace!(%function, "Address is inside function");

    let cmd = command::info_functions(&function);
    let frame = debugger.execute(&cmd).await?;
    let Some(file) = console::parse_function_file(&frame.body)? else {
        return Ok(None);
    };

    let cmd = command::disassemble_source(&function);
    let frame = debugger.execute(&cmd).await?;
    let Some(line) = console::parse_disassembly_line(&frame.body, pc)? else {
        return Ok(None);
    };

    Ok(Some(SourceLocation { file, line }))
}

async fn breakpoint_structured<D: Debugger + ?Sized>(
    debugger: &D,
    query: &LineQuery,
) -> Result<Option<Address>> {
    let cmd = command::mi_symbol_list_lines(query.file());
    let frame = debugger.execute(&cmd).await?;

    // An unknown source file has no instructions at all
    if frame.is_error() {
        tracing::debug!(error = %frame.error_message(), "Debugger has no line table for file");
        return Ok(None);
    }

    let table = mi::parse_line_table(&frame.body)?;
    Ok(mi::lowest_address_for_line(&table, query.line()))
}

async fn breakpoint_console<D: Debugger + ?Sized>(
    debugger: &D,
    query: &LineQuery,
) -> Result<Option<Address>> {
    let cmd = command::info_line(query.file(), query.line());
    let frame = debugger.execute(&cmd).await?;

    // Unknown files are reported on stderr, leaving stdout empty
    if frame.diagnostics.contains("No source file named") {
        return Ok(None);
    }
    console::parse_info_line(&frame.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdb::FrameStatus;
    use crate::Error;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers commands from a fixed script and records what it was asked
    struct ScriptedDebugger {
        dialect: Dialect,
        replies: HashMap<String, Frame>,
        issued: Mutex<Vec<String>>,
    }

    impl ScriptedDebugger {
        fn new(dialect: Dialect) -> Self {
            Self {
                dialect,
                replies: HashMap::new(),
                issued: Mutex::new(Vec::new()),
            }
        }

        fn reply(mut self, command: &str, status: FrameStatus, body: &str) -> Self {
            self.replies
                .insert(command.to_string(), Frame::new(status, body));
            self
        }

        fn issued(&self) -> Vec<String> {
            self.issued.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Debugger for ScriptedDebugger {
        fn dialect(&self) -> Dialect {
            self.dialect
        }

        async fn execute(&self, command: &str) -> Result<Frame> {
            self.issued.lock().unwrap().push(command.to_string());
            self.replies
                .get(command)
                .cloned()
                .ok_or_else(|| Error::Internal(format!("unscripted command {}", command)))
        }
    }

    /// Fake target whose MI answers are generated from one line table
    struct LineTableDebugger {
        file: String,
        table: Vec<(u64, u32)>,
    }

    #[async_trait]
    impl Debugger for LineTableDebugger {
        fn dialect(&self) -> Dialect {
            Dialect::Structured
        }

        async fn execute(&self, command: &str) -> Result<Frame> {
            if let Some(file) = command.strip_prefix("-symbol-list-lines ") {
                assert_eq!(file, self.file);
                let entries: Vec<String> = self
                    .table
                    .iter()
                    .map(|(pc, line)| format!("{{pc=\"{:#x}\",line=\"{}\"}}", pc, line))
                    .collect();
                return Ok(Frame::new(
                    FrameStatus::Done,
                    format!("lines=[{}]", entries.join(",")),
                ));
            }

            let start = command
                .strip_prefix("-data-disassemble -s ")
                .and_then(|rest| rest.split_whitespace().next())
                .expect("disassemble command")
                .parse::<Address>()?;
            let line = self
                .table
                .iter()
                .filter(|(pc, _)| *pc <= start.value())
                .max_by_key(|(pc, _)| *pc)
                .map(|(_, line)| *line)
                .expect("address inside table");
            Ok(Frame::new(
                FrameStatus::Done,
                format!(
                    "asm_insns=[src_and_asm_line={{line=\"{}\",file=\"{}\",fullname=\"{}\",line_asm_insn=[{{address=\"{}\"}}]}}]",
                    line, self.file, self.file, start
                ),
            ))
        }
    }

    #[tokio::test]
    async fn test_structured_address_with_debug_info() {
        let dbg = ScriptedDebugger::new(Dialect::Structured).reply(
            "-data-disassemble -s 0x80000090 -e 0x80000094 -- 4",
            FrameStatus::Done,
            r#"asm_insns=[src_and_asm_line={line="69",file="/p/a.c",fullname="/p/a.c",line_asm_insn=[{address="0x80000090",func-name="schedule",offset="16",inst="auipc\ta5,0x3"}]}]"#,
        );

        let loc = Resolver::default()
            .resolve_address(&dbg, AddressQuery::new(Address(0x8000_0090)))
            .await
            .unwrap();
        assert_eq!(
            loc,
            Some(SourceLocation {
                file: "/p/a.c".to_string(),
                line: 69
            })
        );
        assert_eq!(dbg.issued().len(), 1);
    }

    #[tokio::test]
    async fn test_structured_address_without_debug_info() {
        let dbg = ScriptedDebugger::new(Dialect::Structured).reply(
            "-data-disassemble -s 0x80000000 -e 0x80000004 -- 4",
            FrameStatus::Done,
            r#"asm_insns=[{address="0x80000000",func-name="_start",offset="0",inst="li\ts0,0"}]"#,
        );

        let loc = Resolver::default()
            .resolve_address(&dbg, AddressQuery::new(Address(0x8000_0000)))
            .await
            .unwrap();
        assert_eq!(loc, None);
    }

    #[tokio::test]
    async fn test_structured_address_error_record() {
        let dbg = ScriptedDebugger::new(Dialect::Structured).reply(
            "-data-disassemble -s 0x10 -e 0x12 -- 4",
            FrameStatus::Error,
            r#"msg="-data-disassemble: Usage: -s start -e end""#,
        );

        let err = Resolver::new(2)
            .resolve_address(&dbg, AddressQuery::new(Address(0x10)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_structured_unmapped_address_is_absent() {
        let dbg = ScriptedDebugger::new(Dialect::Structured)
            .reply(
                "-data-disassemble -s 0xdead0000 -e 0xdead0004 -- 4",
                FrameStatus::Error,
                r#"msg="Cannot access memory at address 0xdead0000""#,
            )
            .reply(
                "-data-disassemble -s 0x20 -e 0x24 -- 4",
                FrameStatus::Error,
                r#"msg="No function contains specified address.""#,
            );

        let resolver = Resolver::default();
        let loc = resolver
            .resolve_address(&dbg, AddressQuery::new(Address(0xdead_0000)))
            .await
            .unwrap();
        assert_eq!(loc, None);
        let loc = resolver
            .resolve_address(&dbg, AddressQuery::new(Address(0x20)))
            .await
            .unwrap();
        assert_eq!(loc, None);
    }

    #[tokio::test]
    async fn test_console_address_chain() {
        let dbg = ScriptedDebugger::new(Dialect::CliText)
            .reply(
                "info symbol 0x80000090",
                FrameStatus::Exited,
                "Reading symbols from os.elf...\nschedule + 16 in section .text\n",
            )
            .reply(
                "info functions ^schedule$",
                FrameStatus::Exited,
                "All functions matching regular expression \"^schedule$\":\n\nFile /p/a.c:\n66:\tvoid schedule();\n",
            )
            .reply(
                "disassemble /s schedule",
                FrameStatus::Exited,
                "Dump of assembler code for function schedule:\n/p/a.c:\n66\tvoid schedule() {\n   0x80000080 <+0>:\taddi\tsp,sp,-16\n69\t  x = 1;\n   0x80000090 <+16>:\tauipc\ta5,0x3\nEnd of assembler dump.\n",
            );

        let loc = Resolver::default()
            .resolve_address(&dbg, AddressQuery::new(Address(0x8000_0090)))
            .await
            .unwrap();
        assert_eq!(
            loc,
            Some(SourceLocation {
                file: "/p/a.c".to_string(),
                line: 69
            })
        );
        assert_eq!(
            dbg.issued(),
            vec![
                "info symbol 0x80000090",
                "info functions ^schedule$",
                "disassemble /s schedule"
            ]
        );
    }

    #[tokio::test]
    async fn test_console_address_stops_at_first_absent_step() {
        let dbg = ScriptedDebugger::new(Dialect::CliText)
            .reply(
                "info symbol 0x80000000",
                FrameStatus::Exited,
                "_start in section .text\n",
            )
            .reply(
                "info functions ^_start$",
                FrameStatus::Exited,
                "All functions matching regular expression \"^_start$\":\n\nNon-debugging symbols:\n0x80000000  _start\n",
            );

        let loc = Resolver::default()
            .resolve_address(&dbg, AddressQuery::new(Address(0x8000_0000)))
            .await
            .unwrap();
        assert_eq!(loc, None);
        assert_eq!(dbg.issued().len(), 2);
    }

    #[tokio::test]
    async fn test_structured_breakpoint() {
        let dbg = ScriptedDebugger::new(Dialect::Structured).reply(
            "-symbol-list-lines /p/a.c",
            FrameStatus::Done,
            r#"lines=[{pc="0x80000010",line="44"},{pc="0x80000024",line="49"}]"#,
        );
        let resolver = Resolver::default();

        let pc = resolver
            .resolve_breakpoint(&dbg, LineQuery::new("/p/a.c", 49).unwrap())
            .await
            .unwrap();
        assert_eq!(pc, Some(Address(0x8000_0024)));

        let none = resolver
            .resolve_breakpoint(&dbg, LineQuery::new("/p/a.c", 50).unwrap())
            .await
            .unwrap();
        assert_eq!(none, None);
    }

    #[tokio::test]
    async fn test_structured_breakpoint_unknown_file_is_absent() {
        let dbg = ScriptedDebugger::new(Dialect::Structured).reply(
            "-symbol-list-lines /p/zz.c",
            FrameStatus::Error,
            r#"msg="-symbol-list-lines: Unknown source file name.""#,
        );

        let pc = Resolver::default()
            .resolve_breakpoint(&dbg, LineQuery::new("/p/zz.c", 1).unwrap())
            .await
            .unwrap();
        assert_eq!(pc, None);
    }

    #[tokio::test]
    async fn test_console_breakpoint() {
        let dbg = ScriptedDebugger::new(Dialect::CliText).reply(
            "info line /p/a.c:49",
            FrameStatus::Exited,
            "Line 49 of \"/p/a.c\" starts at address 0x80000024 <main+20> and ends at 0x80000030 <main+32>.\n",
        );

        let pc = Resolver::default()
            .resolve_breakpoint(&dbg, LineQuery::new("/p/a.c", 49).unwrap())
            .await
            .unwrap();
        assert_eq!(pc, Some(Address(0x8000_0024)));
    }

    #[tokio::test]
    async fn test_console_breakpoint_unknown_file_on_stderr() {
        let mut dbg = ScriptedDebugger::new(Dialect::CliText).reply(
            "info line /p/zz.c:3",
            FrameStatus::Exited,
            "Reading symbols from os.elf...\n",
        );
        if let Some(frame) = dbg.replies.get_mut("info line /p/zz.c:3") {
            frame.diagnostics = "No source file named /p/zz.c.\n".to_string();
        }

        let pc = Resolver::default()
            .resolve_breakpoint(&dbg, LineQuery::new("/p/zz.c", 3).unwrap())
            .await
            .unwrap();
        assert_eq!(pc, None);
    }

    #[tokio::test]
    async fn test_breakpoint_address_resolves_back_to_its_line() {
        let dbg = LineTableDebugger {
            file: "/p/a.c".to_string(),
            table: vec![
                (0x8000_0010, 44),
                (0x8000_0018, 45),
                (0x8000_0024, 49),
                (0x8000_002c, 45),
                (0x8000_0030, 49),
            ],
        };
        let resolver = Resolver::default();

        for line in [44, 45, 49] {
            let pc = resolver
                .resolve_breakpoint(&dbg, LineQuery::new("/p/a.c", line).unwrap())
                .await
                .unwrap()
                .unwrap();
            let loc = resolver
                .resolve_address(&dbg, AddressQuery::new(pc))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(loc.line, line);
        }
    }

    #[tokio::test]
    async fn test_address_at_end_of_space() {
        let dbg = ScriptedDebugger::new(Dialect::Structured);
        let err = Resolver::default()
            .resolve_address(&dbg, AddressQuery::new(Address(u64::MAX)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
        assert!(dbg.issued().is_empty());
    }
}
