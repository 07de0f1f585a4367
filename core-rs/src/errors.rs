//! Error types for rebind

use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RebindError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid port range: [{min}, {max}) is empty")]
    InvalidPortRange { min: u16, max: u16 },

    #[error("Invalid address binding '{0}': expected NAME:PORT")]
    InvalidBinding(String),

    #[error("Public port {0} is declared more than once")]
    DuplicatePort(u16),

    #[error("You must provide a command to run")]
    MissingCommand,

    #[error("Failed to listen on port {port}: {source}")]
    ListenFailed {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Error executing command '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to terminate process group {pgid}: {reason}")]
    TerminateFailed { pgid: u32, reason: String },

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Could not walk directories: {0}")]
    WalkFailed(#[from] walkdir::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RebindError>;
