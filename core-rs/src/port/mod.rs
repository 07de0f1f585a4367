/**
 * port module
 * Stable public listeners in front of a rotating destination port
 */

pub mod allocator;
pub mod destination;
pub mod forwarder;
pub mod registry;

pub use allocator::{PortAllocator, PortRange};
pub use destination::DestinationPort;
pub use forwarder::{PortForwarder, DESTINATION_HOST};
pub use registry::ForwarderRegistry;
