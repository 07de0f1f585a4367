// Debouncer Contract Tests
//
// A burst of file events must become exactly one restart, and only once the
// tree has been quiet for the whole delay. Time is paused so these run
// instantly and deterministically.

use rebind_core::watch::{Debouncer, RestartSignal, DEFAULT_QUEUE_CAPACITY};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

const DELAY: Duration = Duration::from_secs(2);

fn start() -> (mpsc::Sender<RestartSignal>, mpsc::Receiver<RestartSignal>) {
    let (input_tx, input_rx) = mpsc::channel(DEFAULT_QUEUE_CAPACITY);
    let (output_tx, output_rx) = mpsc::channel(DEFAULT_QUEUE_CAPACITY);
    tokio::spawn(Debouncer::new(DELAY).run(input_rx, output_tx));
    (input_tx, output_rx)
}

/// Count pulses that arrive before `deadline`
async fn pulses_until(output: &mut mpsc::Receiver<RestartSignal>, deadline: Duration) -> usize {
    let mut count = 0;
    let end = Instant::now() + deadline;
    while let Ok(Some(_)) = time::timeout_at(end, output.recv()).await {
        count += 1;
    }
    count
}

/// WHY: N events spaced closer than the delay produce exactly one pulse
/// REASON: Editors write several files per save; one save is one restart
/// BREAKS: Restart storms that kill the child mid-startup
#[tokio::test(start_paused = true)]
async fn burst_yields_one_pulse_after_last_event() {
    let (input, mut output) = start();

    let first = Instant::now();
    for _ in 0..10 {
        input.send(RestartSignal).await.unwrap();
        time::sleep(Duration::from_millis(1500)).await;
    }
    let last_event = first + Duration::from_millis(1500 * 9);

    output.recv().await.expect("one pulse");
    assert!(
        Instant::now() >= last_event + DELAY,
        "Pulse fired before the tree was quiet for the full delay"
    );

    assert_eq!(pulses_until(&mut output, DELAY * 3).await, 0);
}

/// WHY: Two bursts separated by more than the delay produce two pulses
/// REASON: Each quiet window after a change is a separate restart
/// BREAKS: Lost reloads after the first one
#[tokio::test(start_paused = true)]
async fn separated_bursts_yield_two_pulses() {
    let (input, mut output) = start();

    for _ in 0..3 {
        input.send(RestartSignal).await.unwrap();
    }
    time::sleep(DELAY * 2).await;

    for _ in 0..3 {
        input.send(RestartSignal).await.unwrap();
    }

    assert_eq!(pulses_until(&mut output, DELAY * 5).await, 2);
}

/// WHY: A single event still restarts
/// REASON: Minimal burst is one event
/// BREAKS: The first save after startup being ignored
#[tokio::test(start_paused = true)]
async fn single_event_yields_one_pulse() {
    let (input, mut output) = start();

    input.send(RestartSignal).await.unwrap();
    let sent_at = Instant::now();

    output.recv().await.expect("one pulse");
    assert!(Instant::now() - sent_at >= DELAY);
}
