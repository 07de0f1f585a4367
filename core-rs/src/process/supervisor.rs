//! Process Supervisor - owns the child and restarts it on demand
//!
//! One cycle:
//! 1. Rotate every forwarder and build the child environment
//! 2. Spawn the child in its own process group (failure is fatal)
//! 3. Block on the next restart pulse
//! 4. SIGKILL the group and reap the child, then go back to 1
//!
//! The loop ends when the pulse channel closes, or when a pulse arrives
//! after the shutdown flag was raised. Either way the current child is
//! killed and reaped before [`Supervisor::run`] returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::command::CommandSpec;
use super::environment::Environment;
use super::lifecycle::{ChildExit, ProcessLifecycle};
use crate::errors::Result;
use crate::port::ForwarderRegistry;
use crate::watch::RestartSignal;

/// Where the supervisor is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No child spawned yet
    Starting,
    /// Child running, waiting for a pulse
    Running,
    /// Child being killed and replaced
    Restarting,
    /// Loop has exited; no child
    Stopped,
}

/// The running child together with the environment it was given
#[derive(Debug)]
pub struct ChildInstance<H> {
    pub handle: H,
    pub environment: Environment,
}

pub struct Supervisor<L: ProcessLifecycle> {
    lifecycle: L,
    command: CommandSpec,
    forwarders: Arc<ForwarderRegistry>,
    shutdown: Arc<AtomicBool>,
    state: SupervisorState,
    restarts: u64,
}

impl<L: ProcessLifecycle> std::fmt::Debug for Supervisor<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("command", &self.command)
            .field("forwarders", &self.forwarders.len())
            .field("state", &self.state)
            .field("restarts", &self.restarts)
            .finish()
    }
}

impl<L: ProcessLifecycle> Supervisor<L> {
    pub fn new(lifecycle: L, command: CommandSpec, forwarders: Arc<ForwarderRegistry>) -> Self {
        Self {
            lifecycle,
            command,
            forwarders,
            shutdown: Arc::new(AtomicBool::new(false)),
            state: SupervisorState::Starting,
            restarts: 0,
        }
    }

    /// Share a shutdown flag. Raise it, then send one pulse, to stop.
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Completed kill-and-respawn cycles
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Inherited environment plus a freshly rotated entry per forwarder
    pub fn build_environment(&self) -> Environment {
        Environment::inherited().with_forwarders(&self.forwarders)
    }

    /// Run the restart loop on the calling thread.
    ///
    /// Must not be called from an async context; it blocks on `signals`.
    ///
    /// # Errors
    /// Spawn failure and group termination failure end the loop with an
    /// error. There is no retry.
    pub fn run(&mut self, mut signals: mpsc::Receiver<RestartSignal>) -> Result<()> {
        loop {
            let mut child = self.spawn_child()?;
            self.state = SupervisorState::Running;

            let pulse = signals.blocking_recv();
            let stopping = pulse.is_none() || self.shutdown.load(Ordering::SeqCst);

            if stopping {
                info!("[Supervisor] Shutting down, stopping child...");
            } else {
                info!("[Supervisor] Files have changed, reloading...");
            }

            self.state = SupervisorState::Restarting;
            self.stop_child(&mut child)?;

            if stopping {
                self.state = SupervisorState::Stopped;
                return Ok(());
            }
            self.restarts += 1;
        }
    }

    fn spawn_child(&self) -> Result<ChildInstance<L::Handle>> {
        let environment = self.build_environment();

        debug!("[Supervisor] Executing command: {}", self.command);
        let handle = self.lifecycle.spawn(&self.command, &environment)?;
        debug!("[Supervisor] Started (PID: {})", self.lifecycle.id(&handle));

        Ok(ChildInstance { handle, environment })
    }

    fn stop_child(&self, child: &mut ChildInstance<L::Handle>) -> Result<ChildExit> {
        let pid = self.lifecycle.id(&child.handle);

        self.lifecycle.terminate_group(&mut child.handle)?;
        let exit = self.lifecycle.wait(&mut child.handle)?;

        debug!("[Supervisor] Reaped PID {} ({:?})", pid, exit);
        Ok(exit)
    }
}
