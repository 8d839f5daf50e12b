//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Debugger settings
    #[serde(default)]
    pub gdb: GdbConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Bridge server settings
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// How the debugger process is driven
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    /// One long-lived `--interpreter=mi` process per session
    #[default]
    Interactive,
    /// One `-ex ... -ex quit` process per command
    Batch,
}

/// What to do with bytes the debugger writes to stderr
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StderrPolicy {
    /// Buffer it and attach it to the next frame as diagnostics
    #[default]
    Diagnostic,
    /// Fail the pending command as soon as anything arrives
    FailFast,
}

/// Debugger settings
#[derive(Debug, Deserialize, Clone)]
pub struct GdbConfig {
    /// Debugger executable name or path
    #[serde(default = "default_executable")]
    pub executable: String,

    #[serde(default)]
    pub mode: LaunchMode,

    /// Byte span of the one-instruction disassembly window
    #[serde(default = "default_instruction_width")]
    pub instruction_width: u64,

    #[serde(default)]
    pub stderr: StderrPolicy,
}

impl Default for GdbConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            mode: LaunchMode::default(),
            instruction_width: default_instruction_width(),
            stderr: StderrPolicy::default(),
        }
    }
}

fn default_executable() -> String {
    "gdb-multiarch".to_string()
}

fn default_instruction_width() -> u64 {
    4
}

/// Timeout settings
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Per-command timeout in seconds (0 disables it)
    #[serde(default = "default_command_secs")]
    pub command_secs: u64,

    /// Time the debugger gets to honour `quit` before it is killed
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command_secs: default_command_secs(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

impl Timeouts {
    pub fn command(&self) -> Option<Duration> {
        (self.command_secs > 0).then(|| Duration::from_secs(self.command_secs))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn default_command_secs() -> u64 {
    30
}
fn default_shutdown_grace() -> u64 {
    100
}

/// Bridge server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BridgeConfig {
    /// Override for the local socket name
    #[serde(default)]
    pub socket_name: Option<String>,

    /// Exit after this many minutes with no client connected
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_minutes: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            socket_name: None,
            idle_timeout_minutes: default_idle_timeout(),
        }
    }
}

fn default_idle_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.gdb.executable.trim().is_empty() {
            return Err(Error::Config("gdb.executable must not be empty".to_string()));
        }
        if self.gdb.instruction_width == 0 {
            return Err(Error::Config(
                "gdb.instruction_width must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Locate the debugger executable
    ///
    /// Values containing a path separator are taken as-is; bare names are
    /// searched for in PATH.
    pub fn resolve_gdb(&self) -> Result<PathBuf> {
        resolve_executable(&self.gdb.executable)
    }
}

/// Turn an executable name or path into a path that can be spawned
pub fn resolve_executable(name: &str) -> Result<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        if candidate.exists() {
            return Ok(candidate.to_path_buf());
        }
        return Err(Error::Spawn(format!("{} does not exist", candidate.display())));
    }

    which::which(name)
        .map_err(|_| Error::Spawn(format!("'{}' not found in PATH", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.gdb.executable, "gdb-multiarch");
        assert_eq!(config.gdb.mode, LaunchMode::Interactive);
        assert_eq!(config.gdb.stderr, StderrPolicy::Diagnostic);
        assert_eq!(config.gdb.instruction_width, 4);
        assert_eq!(config.timeouts.command(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[gdb]\nexecutable = \"riscv64-unknown-elf-gdb\"\nmode = \"batch\"\nstderr = \"fail_fast\"\n\n[timeouts]\ncommand_secs = 0"
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.gdb.executable, "riscv64-unknown-elf-gdb");
        assert_eq!(config.gdb.mode, LaunchMode::Batch);
        assert_eq!(config.gdb.stderr, StderrPolicy::FailFast);
        assert_eq!(config.gdb.instruction_width, 4);
        assert_eq!(config.timeouts.command(), None);
        assert_eq!(config.bridge.idle_timeout_minutes, 30);
    }

    #[test]
    fn test_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gdb]\nmode = \"sideways\"").unwrap();

        assert!(matches!(
            Config::load_from(file.path()),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_zero_instruction_width_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gdb]\ninstruction_width = 0").unwrap();

        assert!(matches!(Config::load_from(file.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_explicit_executable() {
        let err = resolve_executable("/definitely/not/here/gdb").unwrap_err();
        assert!(matches!(err, Error::Spawn(_)));
    }
}
