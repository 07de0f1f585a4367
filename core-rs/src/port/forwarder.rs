//! TCP port forwarding from a fixed public port to the current child.
//!
//! Each forwarder owns one listener for the whole life of the supervisor.
//! Accepted connections are relayed to `localhost:<destination>`, where the
//! destination is whatever port the running child was told to bind.
//!
//! # Rotation
//!
//! [`PortForwarder::cycle`] draws the next port from the shared
//! [`PortAllocator`] and stores it. The accept loop reads the destination
//! exactly once per connection, before dialing:
//!
//! - connections accepted after a rotation go to the new child
//! - connections already relaying stay on the old port until either side
//!   closes
//!
//! # Failure handling
//!
//! - dial failure: the inbound socket is closed and the loop keeps accepting
//!   (the child may still be starting up)
//! - relay EOF or I/O error in either direction: both sockets are closed
//! - bind failure: returned from [`PortForwarder::bind`], fatal to startup
//! - accept error: logged, then accepting resumes after a short pause
//!
//! # Listening address
//!
//! The public port is bound on `[::]`, which on dual-stack hosts also
//! accepts IPv4 clients. Hosts without IPv6 get `0.0.0.0` instead.
//!
//! # Example
//!
//! ```ignore
//! use rebind_core::port::{PortAllocator, PortForwarder, PortRange};
//! use std::sync::Arc;
//!
//! let allocator = Arc::new(PortAllocator::new(PortRange::new(50000, 60000)?));
//! let forwarder = Arc::new(PortForwarder::bind("APP_ADDR", 8080, allocator).await?);
//!
//! let port = forwarder.cycle(); // child should bind localhost:{port}
//! tokio::spawn(forwarder.clone().run());
//! ```

use super::allocator::PortAllocator;
use super::destination::DestinationPort;
use crate::errors::{RebindError, Result};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Host the child is told to bind, and the host forwarders dial.
pub const DESTINATION_HOST: &str = "localhost";

/// Pause after a failed accept so fd exhaustion does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A forwarder from one public port to the rotating destination.
#[derive(Debug)]
pub struct PortForwarder {
    env_name: String,
    source_port: u16,
    destination: DestinationPort,
    allocator: Arc<PortAllocator>,
    listener: TcpListener,
}

impl PortForwarder {
    /// Bind the public listener on all interfaces, IPv6 and IPv4.
    ///
    /// Port 0 binds an ephemeral port; see [`PortForwarder::local_addr`].
    pub async fn bind(
        env_name: impl Into<String>,
        source_port: u16,
        allocator: Arc<PortAllocator>,
    ) -> Result<Self> {
        let listener = bind_public(source_port)
            .await
            .map_err(|e| RebindError::ListenFailed {
                port: source_port,
                source: e,
            })?;

        let env_name = env_name.into();
        info!("[Forwarder] {} listening on {}", env_name, listener.local_addr()?);

        Ok(Self {
            env_name,
            source_port,
            destination: DestinationPort::new(),
            allocator,
            listener,
        })
    }

    /// Rotate to the next destination port and return it.
    pub fn cycle(&self) -> u16 {
        let port = self.allocator.cycle();
        self.destination.store(port);
        debug!(
            "[Forwarder] {} :{} -> {}:{}",
            self.env_name, self.source_port, DESTINATION_HOST, port
        );
        port
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    /// Declared public port (0 if bound ephemerally)
    pub fn source_port(&self) -> u16 {
        self.source_port
    }

    pub fn destination(&self) -> Option<u16> {
        self.destination.load()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. Runs until the task is dropped.
    pub async fn run(self: Arc<Self>) {
        loop {
            let (inbound, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("[Forwarder] {} accept error: {}", self.env_name, e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            // Read once: this connection is pinned to the child running now.
            let destination = self.destination.load();
            debug!(
                "[Forwarder] {} connection from {} -> {:?}",
                self.env_name, peer, destination
            );

            tokio::spawn(forward_connection(inbound, destination));
        }
    }
}

/// Bind `[::]:port`, falling back to `0.0.0.0:port` when the host has no
/// IPv6. A port already taken is never retried on the other family.
async fn bind_public(port: u16) -> io::Result<TcpListener> {
    match TcpListener::bind(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))).await {
        Ok(listener) => Ok(listener),
        Err(e) if matches!(e.kind(), io::ErrorKind::AddrInUse | io::ErrorKind::PermissionDenied) => {
            Err(e)
        }
        Err(e) => {
            debug!("[Forwarder] IPv6 unavailable ({}), listening on IPv4 only", e);
            TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await
        }
    }
}

/// Dial the destination and relay until either side closes.
async fn forward_connection(inbound: TcpStream, destination: Option<u16>) {
    let Some(port) = destination else {
        warn!("[Forwarder] No destination assigned yet, dropping connection");
        return;
    };

    let outbound = match dial(port).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("[Forwarder] Could not connect to {}:{}: {}", DESTINATION_HOST, port, e);
            return;
        }
    };

    relay(inbound, outbound).await;
}

/// Connect to `localhost:port`, trying each resolved address in turn.
async fn dial(port: u16) -> Result<TcpStream> {
    let mut last_err = None;

    for addr in lookup_host((DESTINATION_HOST, port)).await? {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(RebindError::ConnectFailed { addr, source: e }),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        RebindError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} did not resolve", DESTINATION_HOST),
        ))
    }))
}

/// Copy bytes both ways. The first direction to finish ends the pair and
/// both sockets close on drop.
async fn relay(mut inbound: TcpStream, mut outbound: TcpStream) {
    let (mut inbound_read, mut inbound_write) = inbound.split();
    let (mut outbound_read, mut outbound_write) = outbound.split();

    let inbound_to_outbound = tokio::io::copy(&mut inbound_read, &mut outbound_write);
    let outbound_to_inbound = tokio::io::copy(&mut outbound_read, &mut inbound_write);

    tokio::select! {
        result = inbound_to_outbound => {
            match result {
                Ok(bytes) => debug!("[Forwarder] inbound->outbound closed after {} bytes", bytes),
                Err(e) => debug!("[Forwarder] inbound->outbound copy ended: {}", e),
            }
        }
        result = outbound_to_inbound => {
            match result {
                Ok(bytes) => debug!("[Forwarder] outbound->inbound closed after {} bytes", bytes),
                Err(e) => debug!("[Forwarder] outbound->inbound copy ended: {}", e),
            }
        }
    }
}
