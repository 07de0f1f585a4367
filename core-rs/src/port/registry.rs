//! Forwarder registry keyed by public port

use super::allocator::PortAllocator;
use super::forwarder::PortForwarder;
use crate::config::AddrBinding;
use crate::errors::{RebindError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// All forwarders declared for this run
#[derive(Debug, Default)]
pub struct ForwarderRegistry {
    forwarders: HashMap<u16, Arc<PortForwarder>>,
}

impl ForwarderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind one forwarder per binding, all drawing from `allocator`.
    ///
    /// # Errors
    /// Fails on the first listener that cannot bind, or on a public port
    /// declared twice.
    pub async fn bind_all(bindings: &[AddrBinding], allocator: Arc<PortAllocator>) -> Result<Self> {
        let mut registry = Self::new();

        for binding in bindings {
            let forwarder =
                PortForwarder::bind(binding.env_name.clone(), binding.port, allocator.clone()).await?;
            registry.insert(forwarder)?;
        }

        Ok(registry)
    }

    /// Register an already bound forwarder under its listening port.
    pub fn insert(&mut self, forwarder: PortForwarder) -> Result<()> {
        let port = forwarder.local_addr()?.port();
        if self.forwarders.contains_key(&port) {
            return Err(RebindError::DuplicatePort(port));
        }
        self.forwarders.insert(port, Arc::new(forwarder));
        Ok(())
    }

    /// Rotate every forwarder, returning `(env_name, destination)` pairs.
    pub fn cycle_all(&self) -> Vec<(String, u16)> {
        self.forwarders
            .values()
            .map(|forwarder| (forwarder.env_name().to_string(), forwarder.cycle()))
            .collect()
    }

    /// Start one accept loop per forwarder.
    pub fn spawn_all(&self) -> Vec<JoinHandle<()>> {
        self.forwarders
            .values()
            .map(|forwarder| {
                debug!("[Forwarder] {} accept loop starting", forwarder.env_name());
                tokio::spawn(forwarder.clone().run())
            })
            .collect()
    }

    pub fn get(&self, port: u16) -> Option<&Arc<PortForwarder>> {
        self.forwarders.get(&port)
    }

    /// Forwarders in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PortForwarder>> {
        self.forwarders.values()
    }

    pub fn len(&self) -> usize {
        self.forwarders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forwarders.is_empty()
    }
}
