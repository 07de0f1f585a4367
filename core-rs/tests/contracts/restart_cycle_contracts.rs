// Restart Cycle Contract Tests
//
// One restart pulse is one kill, one reap and one respawn, in that order,
// with every forwarder rotated for the new child. The lifecycle is recorded
// rather than real so the order of operations is observable.

use rebind_core::config::AddrBinding;
use rebind_core::errors::Result;
use rebind_core::port::{ForwarderRegistry, PortAllocator, PortRange};
use rebind_core::process::{ChildExit, CommandSpec, Environment, ProcessLifecycle, Supervisor};
use rebind_core::watch::RestartSignal;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
enum Op {
    Spawn { id: u32, a: String, b: String },
    TerminateGroup(u32),
    Reap(u32),
}

#[derive(Clone, Default)]
struct Recorder {
    ops: Arc<Mutex<Vec<Op>>>,
}

impl Recorder {
    fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }
}

impl ProcessLifecycle for Recorder {
    type Handle = u32;

    fn spawn(&self, _command: &CommandSpec, env: &Environment) -> Result<u32> {
        let mut ops = self.ops.lock().unwrap();
        let id = ops.iter().filter(|op| matches!(op, Op::Spawn { .. })).count() as u32 + 1;
        let var = |name: &str| {
            env.get(name)
                .map(|v| v.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        ops.push(Op::Spawn {
            id,
            a: var("A_ADDR"),
            b: var("B_ADDR"),
        });
        Ok(id)
    }

    fn terminate_group(&self, handle: &mut u32) -> Result<()> {
        self.ops.lock().unwrap().push(Op::TerminateGroup(*handle));
        Ok(())
    }

    fn wait(&self, handle: &mut u32) -> Result<ChildExit> {
        self.ops.lock().unwrap().push(Op::Reap(*handle));
        Ok(ChildExit::Signaled(9))
    }

    fn id(&self, handle: &u32) -> u32 {
        *handle
    }
}

fn two_forwarders(rt: &tokio::runtime::Runtime) -> Arc<ForwarderRegistry> {
    let allocator = Arc::new(PortAllocator::new(PortRange::new(50000, 50010).unwrap()));
    let bindings = [AddrBinding::new("A_ADDR", 0), AddrBinding::new("B_ADDR", 0)];
    Arc::new(rt.block_on(ForwarderRegistry::bind_all(&bindings, allocator)).unwrap())
}

/// WHY: One pulse = terminate group, reap, spawn with rotated env, in order
/// REASON: The new child must never start while the old one still holds its port
/// BREAKS: Orphaned grandchildren and stale addresses after reload
#[test]
fn one_pulse_is_kill_reap_respawn_with_fresh_addresses() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let recorder = Recorder::default();
    let mut supervisor = Supervisor::new(
        recorder.clone(),
        CommandSpec::new("./server", Vec::new()),
        two_forwarders(&rt),
    );

    let (tx, rx) = mpsc::channel(8);
    tx.blocking_send(RestartSignal).unwrap();
    drop(tx);

    supervisor.run(rx).unwrap();
    assert_eq!(supervisor.restarts(), 1);

    let ops = recorder.ops();
    assert_eq!(ops.len(), 6, "Unexpected lifecycle sequence: {:?}", ops);
    assert!(matches!(ops[0], Op::Spawn { id: 1, .. }));
    assert_eq!(ops[1], Op::TerminateGroup(1));
    assert_eq!(ops[2], Op::Reap(1));
    assert!(matches!(ops[3], Op::Spawn { id: 2, .. }));
    assert_eq!(ops[4], Op::TerminateGroup(2));
    assert_eq!(ops[5], Op::Reap(2));

    let (Op::Spawn { a: a1, b: b1, .. }, Op::Spawn { a: a2, b: b2, .. }) = (&ops[0], &ops[3]) else {
        unreachable!()
    };

    // Every forwarder gets a fresh destination on every spawn
    for addr in [a1, b1, a2, b2] {
        assert!(addr.starts_with("localhost:5000"), "Bad address: {}", addr);
    }
    assert_ne!(a1, a2);
    assert_ne!(b1, b2);
    assert_ne!(a1, b1);
    assert_ne!(a2, b2);
}

/// WHY: No pulse, no restart
/// REASON: The supervisor only reacts to the debouncer
/// BREAKS: Spurious restarts killing healthy children
#[test]
fn closed_channel_without_pulse_spawns_once() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let recorder = Recorder::default();
    let mut supervisor = Supervisor::new(
        recorder.clone(),
        CommandSpec::new("./server", Vec::new()),
        two_forwarders(&rt),
    );

    let (tx, rx) = mpsc::channel::<RestartSignal>(8);
    drop(tx);

    supervisor.run(rx).unwrap();

    assert_eq!(supervisor.restarts(), 0);
    let ops = recorder.ops();
    assert_eq!(ops.len(), 3);
    assert_eq!(ops[1], Op::TerminateGroup(1));
    assert_eq!(ops[2], Op::Reap(1));
}
