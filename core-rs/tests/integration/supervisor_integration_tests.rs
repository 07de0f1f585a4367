//! Supervisor Integration Tests
//!
//! Real children under `sh`. Each child records the address it was given
//! and the PID of a background grandchild, so the tests can check both the
//! environment contract and that the whole process group dies on restart.
//!
//! Liveness is read from /proc, so these run on Linux only.

#![cfg(target_os = "linux")]

use rebind_core::config::AddrBinding;
use rebind_core::errors::RebindError;
use rebind_core::port::{ForwarderRegistry, PortAllocator, PortRange};
use rebind_core::process::{CommandSpec, Supervisor, SupervisorState, SystemLifecycle};
use rebind_core::watch::RestartSignal;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc;

fn registry(rt: &tokio::runtime::Runtime) -> Arc<ForwarderRegistry> {
    let allocator = Arc::new(PortAllocator::new(PortRange::new(50000, 50003).unwrap()));
    let bindings = [AddrBinding::new("APP_ADDR", 0)];
    Arc::new(rt.block_on(ForwarderRegistry::bind_all(&bindings, allocator)).unwrap())
}

/// Child that logs `$APP_ADDR`, starts a grandchild, and waits on it
fn recording_child(dir: &Path) -> CommandSpec {
    let script = format!(
        "echo \"$APP_ADDR\" >> '{addrs}'; sleep 300 & echo $! >> '{pids}'; wait",
        addrs = dir.join("addrs").display(),
        pids = dir.join("pids").display(),
    );
    CommandSpec::new("sh", vec!["-c".to_string(), script]).with_working_dir(dir)
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn wait_for_lines(path: &Path, count: usize) -> Vec<String> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let lines = read_lines(path);
        if lines.len() >= count {
            return lines;
        }
        assert!(
            Instant::now() < deadline,
            "Timed out waiting for {} lines in {}",
            count,
            path.display()
        );
        thread::sleep(Duration::from_millis(20));
    }
}

/// Running and not a zombie
fn is_alive(pid: &str) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => false,
    }
}

fn wait_until_dead(pid: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while is_alive(pid) {
        assert!(Instant::now() < deadline, "PID {} survived its process group", pid);
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_restart_kills_group_and_rotates_address() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let temp = TempDir::new().unwrap();
    let dir = temp.path().to_path_buf();

    let mut supervisor = Supervisor::new(SystemLifecycle, recording_child(&dir), registry(&rt));
    let (tx, rx) = mpsc::channel(8);
    let runner = thread::spawn(move || {
        let result = supervisor.run(rx);
        (supervisor, result)
    });

    let pids = wait_for_lines(&dir.join("pids"), 1);
    assert!(is_alive(&pids[0]));

    tx.blocking_send(RestartSignal).unwrap();
    let pids = wait_for_lines(&dir.join("pids"), 2);
    wait_until_dead(&pids[0]);
    assert!(is_alive(&pids[1]));

    drop(tx);
    let (supervisor, result) = runner.join().unwrap();
    assert!(result.is_ok());
    assert_eq!(supervisor.restarts(), 1);
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    wait_until_dead(&pids[1]);

    assert_eq!(
        read_lines(&dir.join("addrs")),
        vec!["localhost:50000", "localhost:50001"]
    );
}

#[test]
fn test_shutdown_flag_stops_child() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let temp = TempDir::new().unwrap();
    let dir = temp.path().to_path_buf();

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut supervisor = Supervisor::new(SystemLifecycle, recording_child(&dir), registry(&rt))
        .with_shutdown(shutdown.clone());
    let (tx, rx) = mpsc::channel(8);
    let runner = thread::spawn(move || {
        let result = supervisor.run(rx);
        (supervisor, result)
    });

    let pids = wait_for_lines(&dir.join("pids"), 1);

    shutdown.store(true, Ordering::SeqCst);
    tx.blocking_send(RestartSignal).unwrap();

    let (supervisor, result) = runner.join().unwrap();
    assert!(result.is_ok());
    assert_eq!(supervisor.restarts(), 0);
    wait_until_dead(&pids[0]);
    assert_eq!(read_lines(&dir.join("addrs")).len(), 1);
}

#[test]
fn test_missing_program_is_fatal() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let command = CommandSpec::new("/nonexistent/rebind-test-program", Vec::new());
    let mut supervisor = Supervisor::new(SystemLifecycle, command, registry(&rt));

    let (_tx, rx) = mpsc::channel(8);
    match supervisor.run(rx) {
        Err(RebindError::SpawnFailed { program, .. }) => {
            assert_eq!(program, "/nonexistent/rebind-test-program");
        }
        other => panic!("Expected SpawnFailed, got {:?}", other),
    }
    assert_eq!(supervisor.restarts(), 0);
}
