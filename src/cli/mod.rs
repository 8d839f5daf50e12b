//! CLI command handling
//!
//! Runs one-shot queries against a fresh session and formats their output.

use crate::bridge::Bridge;
use crate::commands::{Commands, DebuggerArgs};
use crate::common::config::{Config, LaunchMode};
use crate::common::{paths, Result};
use crate::gdb::{Address, AddressQuery, LineQuery, Session, SessionOptions};
use crate::resolver::Resolver;

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Resolve {
            target,
            pc,
            debugger,
        } => {
            let pc: Address = pc.parse()?;
            let config = load_config(&debugger)?;
            let session = Session::start(SessionOptions::from_config(&config)?, &target).await?;

            let result = Resolver::from_config(&config)
                .resolve_address(&session, AddressQuery::new(pc))
                .await;
            session.shutdown().await;

            match result? {
                Some(location) => println!("{}", location),
                None => println!("no debug information for {}", pc),
            }
            Ok(())
        }

        Commands::Breakpoint {
            target,
            file,
            line,
            debugger,
        } => {
            let query = LineQuery::new(file.clone(), line)?;
            let config = load_config(&debugger)?;
            let session = Session::start(SessionOptions::from_config(&config)?, &target).await?;

            let result = Resolver::from_config(&config)
                .resolve_breakpoint(&session, query)
                .await;
            session.shutdown().await;

            match result? {
                Some(pc) => println!("{}", pc),
                None => println!("no instruction maps to {}:{}", file, line),
            }
            Ok(())
        }

        Commands::Serve { stdio, debugger } => {
            let config = load_config(&debugger)?;
            let options = SessionOptions::from_config(&config)?;
            let bridge = Bridge::new(config, options);

            if stdio {
                bridge.run_stdio().await
            } else {
                bridge.run().await
            }
        }

        Commands::Config => {
            match paths::config_path() {
                Some(path) if path.exists() => println!("Config file: {}", path.display()),
                Some(path) => println!(
                    "Config file: {} (not present, using defaults)",
                    path.display()
                ),
                None => println!("Config file: unavailable (no home directory)"),
            }

            let config = Config::load()?;
            println!("Mode:        {:?}", config.gdb.mode);
            match config.resolve_gdb() {
                Ok(path) => println!("Debugger:    {}", path.display()),
                Err(e) => println!("Debugger:    {} ({})", config.gdb.executable, e),
            }
            Ok(())
        }
    }
}

/// Load the config file and apply command-line overrides
fn load_config(args: &DebuggerArgs) -> Result<Config> {
    let mut config = Config::load()?;
    apply_overrides(&mut config, args);
    Ok(config)
}

fn apply_overrides(config: &mut Config, args: &DebuggerArgs) {
    if let Some(gdb) = &args.gdb {
        config.gdb.executable = gdb.clone();
    }
    if args.batch {
        config.gdb.mode = LaunchMode::Batch;
    }
    if let Some(secs) = args.timeout {
        config.timeouts.command_secs = secs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        apply_overrides(
            &mut config,
            &DebuggerArgs {
                gdb: Some("/opt/riscv/bin/riscv64-unknown-elf-gdb".into()),
                batch: true,
                timeout: Some(0),
            },
        );

        assert_eq!(config.gdb.executable, "/opt/riscv/bin/riscv64-unknown-elf-gdb");
        assert_eq!(config.gdb.mode, LaunchMode::Batch);
        assert_eq!(config.timeouts.command(), None);
    }

    #[test]
    fn test_no_overrides_keeps_config() {
        let mut config = Config::default();
        apply_overrides(&mut config, &DebuggerArgs::default());

        assert_eq!(config.gdb.executable, "gdb-multiarch");
        assert_eq!(config.gdb.mode, LaunchMode::Interactive);
        assert_eq!(config.timeouts.command(), Some(Duration::from_secs(30)));
    }
}
