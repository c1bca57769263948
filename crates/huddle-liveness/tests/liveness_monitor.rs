//! Integration tests for the probe timer and the sweep cycle.
//!
//! Uses `start_paused = true` so Tokio auto-advances time and
//! `sleep_until` resolves instantly once nothing else can run.

use std::time::Duration;

use huddle_liveness::{LivenessConfig, LivenessMonitor};
use huddle_transport::ConnectionId;

// =========================================================================
// Helpers
// =========================================================================

fn every_second() -> LivenessConfig {
    LivenessConfig::with_interval(Duration::from_secs(1))
}

fn cid(id: u64) -> ConnectionId {
    ConnectionId::new(id)
}

// =========================================================================
// Monitor creation and accessors
// =========================================================================

#[test]
fn test_monitor_initial_state() {
    let m = LivenessMonitor::new(every_second());
    assert_eq!(m.round(), 0);
    assert_eq!(m.tracked(), 0);
    assert!(m.is_enabled());
    assert_eq!(m.probe_interval(), Some(Duration::from_secs(1)));
}

#[test]
fn test_monitor_disabled() {
    let m = LivenessMonitor::new(LivenessConfig::disabled());
    assert!(!m.is_enabled());
    assert_eq!(m.probe_interval(), None);
}

// =========================================================================
// Timer
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_first_probe_fires_after_one_interval() {
    let start = tokio::time::Instant::now();
    let mut m = LivenessMonitor::new(every_second());

    let info = m.wait_for_probe().await;

    assert_eq!(info.round, 1);
    assert_eq!(info.rounds_skipped, 0);
    assert!(start.elapsed() >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_rounds_increment_monotonically() {
    let mut m = LivenessMonitor::new(every_second());

    for expected in 1..=5 {
        let info = m.wait_for_probe().await;
        assert_eq!(info.round, expected);
    }
    assert_eq!(m.round(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_never_fires() {
    let mut m = LivenessMonitor::new(LivenessConfig::disabled());

    let result =
        tokio::time::timeout(Duration::from_secs(3600), m.wait_for_probe())
            .await;
    assert!(result.is_err(), "disabled monitor should pend forever");
}

#[tokio::test(start_paused = true)]
async fn test_late_owner_skips_rounds_instead_of_bursting() {
    let mut m = LivenessMonitor::new(every_second());

    // The owner is busy for 3.5 intervals before polling again.
    tokio::time::advance(Duration::from_millis(3500)).await;
    let info = m.wait_for_probe().await;
    assert_eq!(info.round, 1);
    assert_eq!(info.late_by, Duration::from_millis(2500));
    assert_eq!(info.rounds_skipped, 2);

    // The next round is a full interval later, not immediate.
    let before = tokio::time::Instant::now();
    m.wait_for_probe().await;
    assert!(before.elapsed() >= Duration::from_secs(1));
    assert_eq!(m.stats().rounds_skipped, 2);
}

#[tokio::test(start_paused = true)]
async fn test_wait_is_cancel_safe() {
    let mut m = LivenessMonitor::new(every_second());

    // Cancelled before the deadline: nothing should change.
    let result =
        tokio::time::timeout(Duration::from_millis(500), m.wait_for_probe())
            .await;
    assert!(result.is_err());
    assert_eq!(m.round(), 0);

    let info = m.wait_for_probe().await;
    assert_eq!(info.round, 1);
}

// =========================================================================
// Full cycle: silent connections go, chatty ones stay
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_silent_connection_evicted_within_two_intervals() {
    let start = tokio::time::Instant::now();
    let mut m = LivenessMonitor::new(every_second());
    m.track(cid(1));

    let mut evicted_at = None;
    for _ in 0..3 {
        m.wait_for_probe().await;
        if m.sweep().evicted.contains(&cid(1)) {
            evicted_at = Some(start.elapsed());
            break;
        }
    }

    let evicted_at = evicted_at.expect("silent connection should be evicted");
    assert!(evicted_at <= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_responsive_connection_never_evicted() {
    let mut m = LivenessMonitor::new(every_second());
    m.track(cid(1));
    m.track(cid(2));

    for _ in 0..20 {
        m.wait_for_probe().await;
        let sweep = m.sweep();
        assert!(!sweep.evicted.contains(&cid(1)));
        // cid(1) answers every ping; cid(2) never does.
        for conn in sweep.probed {
            if conn == cid(1) {
                m.acknowledge(conn);
            }
        }
    }

    assert_eq!(m.is_alive(cid(1)), Some(true));
    assert_eq!(m.is_alive(cid(2)), None);
    assert_eq!(m.stats().evictions, 1);
}

// =========================================================================
// select! loop pattern (mirrors the hub)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_select_loop_pattern() {
    let mut m = LivenessMonitor::new(every_second());
    let (tx, mut rx) = tokio::sync::mpsc::channel::<&str>(10);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3100)).await;
        tx.send("stop").await.ok();
    });

    let mut rounds = 0u64;
    loop {
        tokio::select! {
            Some(cmd) = rx.recv() => {
                assert_eq!(cmd, "stop");
                break;
            }
            info = m.wait_for_probe() => {
                rounds += 1;
                m.sweep();
                assert_eq!(info.round, rounds);
            }
        }
    }

    assert_eq!(rounds, 3);
}
