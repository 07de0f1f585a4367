//! # rebind - restart-on-change supervisor with stable ports
//!
//! Restarts a long-running, socket-binding program whenever its sources
//! change, without clients ever seeing "address already in use" or a
//! moving port.
//!
//! ## Core Principle
//!
//! **Clients talk to forwarders, never to the child**: every public port is
//! held by a forwarder for the supervisor's whole life. Each spawn tells the
//! child a fresh `localhost:<port>` to bind through an environment variable,
//! so the new instance never fights its predecessor's lingering socket.
//!
//! ## Architecture
//!
//! ```text
//!  file events ──► ChangeWatcher ──► Debouncer ──► Supervisor ──► child
//!                                                      │            ▲
//!                                             cycle()  ▼            │
//!  clients ──► :8080 ─────────────────────────► PortForwarder ──────┘
//!                                              localhost:<dest>
//! ```
//!
//! - `port`: cyclic allocator, destination cell, forwarders, registry
//! - `watch`: path filter, filesystem watcher, debouncer
//! - `process`: command, environment, lifecycle capability, supervisor
//! - `config`: defaults, YAML file, validation

pub mod config;
pub mod errors;
pub mod logging;
pub mod port;
pub mod process;
pub mod watch;

pub use config::{AddrBinding, FileConfig, SupervisorConfig};
pub use errors::{RebindError, Result};
pub use port::{DestinationPort, ForwarderRegistry, PortAllocator, PortForwarder, PortRange};
pub use process::{ChildExit, CommandSpec, Environment, ProcessLifecycle, Supervisor, SupervisorState, SystemLifecycle};
pub use watch::{ChangeWatcher, Debouncer, PathFilter, RestartSignal};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
