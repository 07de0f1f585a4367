/**
 * config.rs
 * Supervisor configuration: defaults, optional YAML file, validation
 *
 * Format (all keys optional):
 * ```yaml
 * watch: ./src
 * regex: "\\.rs$"
 * ignore: "\\.git|target"
 * addr_env:
 *   - APP_ADDR:8080
 * port_min: 50000
 * port_max: 60000
 * debounce: 2s
 * poll: false
 * poll_interval: 1s
 * command: ["cargo", "run"]
 * ```
 *
 * Command-line flags override file values; file values override defaults.
 */

use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{RebindError, Result};
use crate::port::PortRange;
use crate::process::CommandSpec;
use crate::watch::PathFilter;

pub const DEFAULT_WATCH_DIR: &str = ".";
pub const DEFAULT_INCLUDE: &str = ".*";
pub const DEFAULT_IGNORE: &str = "\\.git";
pub const DEFAULT_PORT_MIN: u16 = 50000;
pub const DEFAULT_PORT_MAX: u16 = 60000;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One `NAME:PORT` pair: the child sees `NAME=localhost:<dest>`, clients
/// connect to `PORT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrBinding {
    pub env_name: String,
    pub port: u16,
}

impl AddrBinding {
    pub fn new(env_name: impl Into<String>, port: u16) -> Self {
        Self {
            env_name: env_name.into(),
            port,
        }
    }
}

impl FromStr for AddrBinding {
    type Err = RebindError;

    fn from_str(s: &str) -> Result<Self> {
        let (name, port) = s
            .split_once(':')
            .ok_or_else(|| RebindError::InvalidBinding(s.to_string()))?;

        let name = name.trim();
        if name.is_empty() || name.contains('=') {
            return Err(RebindError::InvalidBinding(s.to_string()));
        }

        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| RebindError::InvalidBinding(s.to_string()))?;

        Ok(AddrBinding::new(name, port))
    }
}

impl fmt::Display for AddrBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.env_name, self.port)
    }
}

/// Parse a duration: bare seconds (`2`, `0.5`) or one or more
/// `<n><unit>` segments with units `ns`, `us`, `ms`, `s`, `m`, `h`
/// (`500ms`, `2s`, `1m30s`, `1h15m`).
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let invalid = || RebindError::Config(format!("Invalid duration: '{}'", s));
    let is_number = |c: char| c.is_ascii_digit() || c == '.';

    if !s.is_empty() && s.chars().all(is_number) {
        let seconds: f64 = s.parse().map_err(|_| invalid())?;
        return Duration::try_from_secs_f64(seconds).map_err(|_| invalid());
    }

    let mut seconds = 0.0;
    let mut rest = s;
    loop {
        let (number, tail) = rest.split_at(rest.find(|c| !is_number(c)).unwrap_or(rest.len()));
        let (unit, tail) = tail.split_at(tail.find(is_number).unwrap_or(tail.len()));

        let value: f64 = number.parse().map_err(|_| invalid())?;
        seconds += match unit {
            "ns" => value / 1e9,
            "us" | "µs" => value / 1e6,
            "ms" => value / 1e3,
            "s" => value,
            "m" => value * 60.0,
            "h" => value * 3600.0,
            _ => return Err(invalid()),
        };

        if tail.is_empty() {
            break;
        }
        rest = tail;
    }

    Duration::try_from_secs_f64(seconds).map_err(|_| invalid())
}

/// Values read from a YAML config file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub watch: Option<PathBuf>,
    pub regex: Option<String>,
    pub ignore: Option<String>,
    pub addr_env: Option<Vec<String>>,
    pub port_min: Option<u16>,
    pub port_max: Option<u16>,
    pub debounce: Option<String>,
    pub poll: Option<bool>,
    pub poll_interval: Option<String>,
    pub verbose: Option<bool>,
    pub command: Option<Vec<String>>,
}

impl FileConfig {
    /// Load a config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RebindError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Fully resolved configuration for one supervisor run
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    pub watch_dir: PathBuf,
    pub include: String,
    pub ignore: String,
    pub bindings: Vec<AddrBinding>,
    pub port_min: u16,
    pub port_max: u16,
    pub debounce: Duration,
    pub poll: bool,
    pub poll_interval: Duration,
    pub verbose: bool,
    pub command: Vec<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from(DEFAULT_WATCH_DIR),
            include: DEFAULT_INCLUDE.to_string(),
            ignore: DEFAULT_IGNORE.to_string(),
            bindings: Vec::new(),
            port_min: DEFAULT_PORT_MIN,
            port_max: DEFAULT_PORT_MAX,
            debounce: DEFAULT_DEBOUNCE,
            poll: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            verbose: false,
            command: Vec::new(),
        }
    }
}

impl SupervisorConfig {
    /// Overlay values present in a config file
    pub fn merge_file(&mut self, file: FileConfig) -> Result<()> {
        if let Some(watch) = file.watch {
            self.watch_dir = watch;
        }
        if let Some(regex) = file.regex {
            self.include = regex;
        }
        if let Some(ignore) = file.ignore {
            self.ignore = ignore;
        }
        if let Some(addr_env) = file.addr_env {
            self.bindings = addr_env
                .iter()
                .map(|s| s.parse())
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(port_min) = file.port_min {
            self.port_min = port_min;
        }
        if let Some(port_max) = file.port_max {
            self.port_max = port_max;
        }
        if let Some(debounce) = file.debounce {
            self.debounce = parse_duration(&debounce)?;
        }
        if let Some(poll) = file.poll {
            self.poll = poll;
        }
        if let Some(interval) = file.poll_interval {
            self.poll_interval = parse_duration(&interval)?;
        }
        if let Some(verbose) = file.verbose {
            self.verbose = verbose;
        }
        if let Some(command) = file.command {
            self.command = command;
        }
        Ok(())
    }

    /// Destination range for the allocator
    pub fn port_range(&self) -> Result<PortRange> {
        PortRange::new(self.port_min, self.port_max)
    }

    pub fn command_spec(&self) -> Result<CommandSpec> {
        CommandSpec::from_argv(&self.command)
    }

    pub fn path_filter(&self) -> Result<PathFilter> {
        PathFilter::new(&self.include, &self.ignore)
    }

    /// Reject anything the core cannot start with
    ///
    /// # Errors
    /// - empty command
    /// - empty port range, or a range starting at 0
    /// - a public port declared twice, or inside the destination range
    /// - an include/ignore pattern that does not compile
    pub fn validate(&self) -> Result<()> {
        self.command_spec()?;
        let range = self.port_range()?;
        self.path_filter()?;

        let mut seen = HashSet::new();
        for binding in &self.bindings {
            if binding.port == 0 {
                return Err(RebindError::InvalidBinding(binding.to_string()));
            }
            if !seen.insert(binding.port) {
                return Err(RebindError::DuplicatePort(binding.port));
            }
            if range.contains(binding.port) {
                return Err(RebindError::Config(format!(
                    "Public port {} ({}) lies inside the destination range [{}, {})",
                    binding.port, binding.env_name, range.start, range.end
                )));
            }
        }

        Ok(())
    }
}
