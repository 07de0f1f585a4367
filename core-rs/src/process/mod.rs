//! Child process management: command, environment, lifecycle, supervisor

pub mod command;
pub mod environment;
pub mod lifecycle;
pub mod supervisor;

pub use command::CommandSpec;
pub use environment::{destination_address, Environment};
pub use lifecycle::{ChildExit, ProcessLifecycle, SystemChild, SystemLifecycle};
pub use supervisor::{ChildInstance, Supervisor, SupervisorState};
