//! Child environment construction
//!
//! Inherited variables first, then one `NAME=localhost:PORT` entry per
//! forwarder. A forwarder entry replaces an inherited variable of the same
//! name.

use std::ffi::{OsStr, OsString};

use crate::port::{ForwarderRegistry, DESTINATION_HOST};

/// Address string handed to the child for a destination port
pub fn destination_address(port: u16) -> String {
    format!("{}:{}", DESTINATION_HOST, port)
}

/// Ordered environment snapshot for one spawn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: Vec<(OsString, OsString)>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of this process's environment
    pub fn inherited() -> Self {
        Self {
            vars: std::env::vars_os().collect(),
        }
    }

    /// Rotate every forwarder and add its entry.
    pub fn with_forwarders(mut self, forwarders: &ForwarderRegistry) -> Self {
        for (name, port) in forwarders.cycle_all() {
            self.set(name, destination_address(port));
        }
        self
    }

    /// Set a variable, replacing any existing value
    pub fn set(&mut self, name: impl Into<OsString>, value: impl Into<OsString>) {
        let name = name.into();
        let value = value.into();
        match self.vars.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, existing)) => *existing = value,
            None => self.vars.push((name, value)),
        }
    }

    pub fn get(&self, name: impl AsRef<OsStr>) -> Option<&OsStr> {
        let name = name.as_ref();
        self.vars
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_os_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
