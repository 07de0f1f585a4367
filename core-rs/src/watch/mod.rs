//! Change detection: path filtering, filesystem watching, debouncing

pub mod debouncer;
pub mod filter;
pub mod watcher;

pub use debouncer::{Debouncer, RestartSignal, DEFAULT_QUEUE_CAPACITY};
pub use filter::PathFilter;
pub use watcher::ChangeWatcher;
