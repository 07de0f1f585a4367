//! Process lifecycle capability: spawn, group termination, reap
//!
//! The supervisor only talks to [`ProcessLifecycle`]. [`SystemLifecycle`]
//! starts the child as the leader of a new process group so one SIGKILL to
//! the group also takes down anything the child started (compilers, `go
//! run` binaries, shell pipelines).
//!
//! Termination is immediate. There is no SIGTERM grace period.

use std::process::{Child, Command, ExitStatus, Stdio};

use super::command::CommandSpec;
use super::environment::Environment;
use crate::errors::{RebindError, Result};

/// How a reaped child ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    Exited(i32),
    Signaled(i32),
    Unknown,
}

impl From<ExitStatus> for ChildExit {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ChildExit::Exited(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ChildExit::Signaled(signal);
            }
        }

        ChildExit::Unknown
    }
}

/// Spawn, kill and reap child processes
pub trait ProcessLifecycle: Send {
    type Handle: Send;

    /// Start the child with exactly `env` as its environment.
    fn spawn(&self, command: &CommandSpec, env: &Environment) -> Result<Self::Handle>;

    /// Kill the child and every process in its group.
    fn terminate_group(&self, handle: &mut Self::Handle) -> Result<()>;

    /// Block until the child has been reaped.
    fn wait(&self, handle: &mut Self::Handle) -> Result<ChildExit>;

    /// Identifier used in logs
    fn id(&self, handle: &Self::Handle) -> u32;
}

/// A child started by [`SystemLifecycle`]
#[derive(Debug)]
pub struct SystemChild {
    child: Child,
    pgid: u32,
}

impl SystemChild {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Process group id; equal to the pid since the child leads its group
    pub fn pgid(&self) -> u32 {
        self.pgid
    }
}

/// OS-backed lifecycle; stdout and stderr are inherited, stdin is null
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLifecycle;

impl ProcessLifecycle for SystemLifecycle {
    type Handle = SystemChild;

    fn spawn(&self, command: &CommandSpec, env: &Environment) -> Result<SystemChild> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .env_clear()
            .envs(env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        if let Some(ref dir) = command.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|e| RebindError::SpawnFailed {
            program: command.program.clone(),
            source: e,
        })?;
        let pgid = child.id();

        Ok(SystemChild { child, pgid })
    }

    #[cfg(unix)]
    fn terminate_group(&self, handle: &mut SystemChild) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(handle.pgid as i32), Signal::SIGKILL) {
            // ESRCH: the whole group is already gone
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(RebindError::TerminateFailed {
                pgid: handle.pgid,
                reason: e.to_string(),
            }),
        }
    }

    #[cfg(not(unix))]
    fn terminate_group(&self, handle: &mut SystemChild) -> Result<()> {
        // No process groups here; only the direct child can be killed.
        match handle.child.kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(RebindError::TerminateFailed {
                pgid: handle.pgid,
                reason: e.to_string(),
            }),
        }
    }

    fn wait(&self, handle: &mut SystemChild) -> Result<ChildExit> {
        Ok(handle.child.wait()?.into())
    }

    fn id(&self, handle: &SystemChild) -> u32 {
        handle.pid()
    }
}
