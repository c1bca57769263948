//! Heartbeat-driven liveness detection for Huddle.
//!
//! One [`LivenessMonitor`] watches every registered connection. It owns a
//! single probe timer and one flag per connection meaning "answered the
//! last probe". Each round:
//!
//! 1. connections whose flag is still `false` are evicted;
//! 2. everyone else has their flag cleared and gets a `ping`.
//!
//! A `pong` sets the flag again via [`LivenessMonitor::acknowledge`]. So
//! a connection that stops answering is gone one to two intervals later,
//! and one that keeps answering is never evicted.
//!
//! The monitor only decides. It returns a [`Sweep`] and leaves sending
//! pings and closing sockets to its owner.
//!
//! # Integration
//!
//! The monitor sits inside the hub's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         _ = monitor.wait_for_probe() => {
//!             let sweep = monitor.sweep();
//!             // close sweep.evicted, ping sweep.probed
//!         }
//!     }
//! }
//! ```
//!
//! Dropping the monitor (when the hub stops) cancels the timer.

use std::collections::HashMap;
use std::time::Duration;

use huddle_transport::ConnectionId;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the liveness monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Time between probe rounds. [`Duration::ZERO`] disables probing.
    pub probe_interval: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            probe_interval: LivenessConfig::DEFAULT_PROBE_INTERVAL,
        }
    }
}

impl LivenessConfig {
    /// Default time between probes.
    pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);

    /// Shortest interval accepted; anything below is raised to this.
    pub const MIN_PROBE_INTERVAL: Duration = Duration::from_millis(10);

    /// A config probing at the given interval.
    pub fn with_interval(probe_interval: Duration) -> Self {
        Self { probe_interval }
    }

    /// A config that never probes.
    pub fn disabled() -> Self {
        Self::with_interval(Duration::ZERO)
    }

    /// Whether probing is on.
    pub fn is_enabled(&self) -> bool {
        !self.probe_interval.is_zero()
    }

    /// Raises a too-short (but non-zero) interval to
    /// [`Self::MIN_PROBE_INTERVAL`]. Called by [`LivenessMonitor::new`].
    pub fn validated(mut self) -> Self {
        if self.is_enabled() && self.probe_interval < Self::MIN_PROBE_INTERVAL {
            warn!(
                interval_ms = self.probe_interval.as_millis() as u64,
                min_ms = Self::MIN_PROBE_INTERVAL.as_millis() as u64,
                "probe interval too short, clamping"
            );
            self.probe_interval = Self::MIN_PROBE_INTERVAL;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Per-round output
// ---------------------------------------------------------------------------

/// Returned by [`LivenessMonitor::wait_for_probe`] when a round is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInfo {
    /// Round number, starting at 1.
    pub round: u64,
    /// How late the timer fired.
    pub late_by: Duration,
    /// Whole rounds skipped because the owner fell behind.
    pub rounds_skipped: u64,
}

/// What the owner must do after a round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sweep {
    /// Connections that missed the previous probe. Already untracked;
    /// the owner terminates them and runs normal close cleanup.
    pub evicted: Vec<ConnectionId>,
    /// Connections to send a `ping` to. Their flag is now `false`.
    pub probed: Vec<ConnectionId>,
}

/// Running counters, mostly for logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeStats {
    /// Rounds swept.
    pub rounds: u64,
    /// Pings requested.
    pub probes_sent: u64,
    /// Connections evicted.
    pub evictions: u64,
    /// Rounds skipped because the owner fell behind.
    pub rounds_skipped: u64,
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Probe timer plus one liveness flag per tracked connection.
pub struct LivenessMonitor {
    interval: Option<Duration>,
    /// When the next round is due (Tokio instant for `sleep_until`).
    next_probe: Option<TokioInstant>,
    round: u64,
    /// `true` = answered the last probe (or hasn't been probed yet).
    flags: HashMap<ConnectionId, bool>,
    stats: ProbeStats,
}

impl LivenessMonitor {
    /// Creates a monitor. The first round is due one interval from now.
    pub fn new(config: LivenessConfig) -> Self {
        let config = config.validated();
        let interval = config.is_enabled().then_some(config.probe_interval);

        match interval {
            Some(d) => debug!(
                interval_ms = d.as_millis() as u64,
                "liveness monitor created"
            ),
            None => debug!("liveness monitor created with probing disabled"),
        }

        Self {
            interval,
            next_probe: interval.map(|d| TokioInstant::now() + d),
            round: 0,
            flags: HashMap::new(),
            stats: ProbeStats::default(),
        }
    }

    /// Starts watching a connection. New connections count as alive.
    pub fn track(&mut self, conn: ConnectionId) {
        self.flags.insert(conn, true);
    }

    /// Stops watching a connection. Returns `false` if it wasn't tracked.
    pub fn untrack(&mut self, conn: ConnectionId) -> bool {
        self.flags.remove(&conn).is_some()
    }

    /// Records a `pong`. Returns `false` if the connection isn't tracked.
    pub fn acknowledge(&mut self, conn: ConnectionId) -> bool {
        match self.flags.get_mut(&conn) {
            Some(alive) => {
                *alive = true;
                trace!(%conn, "liveness acknowledged");
                true
            }
            None => false,
        }
    }

    /// Current flag for `conn`, or `None` if untracked.
    pub fn is_alive(&self, conn: ConnectionId) -> Option<bool> {
        self.flags.get(&conn).copied()
    }

    /// Waits until the next round is due.
    ///
    /// With probing disabled this future never resolves, which is fine
    /// inside `tokio::select!`. It is cancel-safe: nothing changes until
    /// the timer has fired.
    pub async fn wait_for_probe(&mut self) -> ProbeInfo {
        let (next, interval) = match (self.next_probe, self.interval) {
            (Some(next), Some(interval)) => (next, interval),
            _ => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.round += 1;

        // Never burst: if we missed whole rounds, skip them and schedule
        // from now.
        let late_by = now.saturating_duration_since(next);
        let rounds_skipped =
            (late_by.as_nanos() / interval.as_nanos()) as u64;
        if rounds_skipped > 0 {
            warn!(
                round = self.round,
                skipped = rounds_skipped,
                late_ms = late_by.as_millis() as u64,
                "liveness probe overrun, skipping ahead"
            );
            self.stats.rounds_skipped += rounds_skipped;
        }
        self.next_probe = Some(now + interval);

        ProbeInfo {
            round: self.round,
            late_by,
            rounds_skipped,
        }
    }

    /// Runs one round over every tracked connection.
    ///
    /// Evicted connections are untracked and are not also probed.
    pub fn sweep(&mut self) -> Sweep {
        let mut sweep = Sweep::default();

        for (&conn, alive) in self.flags.iter_mut() {
            if *alive {
                *alive = false;
                sweep.probed.push(conn);
            } else {
                sweep.evicted.push(conn);
            }
        }
        for conn in &sweep.evicted {
            self.flags.remove(conn);
        }
        sweep.evicted.sort();
        sweep.probed.sort();

        self.stats.rounds += 1;
        self.stats.probes_sent += sweep.probed.len() as u64;
        self.stats.evictions += sweep.evicted.len() as u64;

        debug!(
            probed = sweep.probed.len(),
            evicted = sweep.evicted.len(),
            "liveness sweep"
        );
        sweep
    }

    /// Number of tracked connections.
    pub fn tracked(&self) -> usize {
        self.flags.len()
    }

    /// Rounds fired so far.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Whether probing is on.
    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    /// The probe interval, or `None` when disabled.
    pub fn probe_interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Counters since creation.
    pub fn stats(&self) -> &ProbeStats {
        &self.stats
    }
}
