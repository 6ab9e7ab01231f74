//! Countdown scheduling
//!
//! Every open round is driven by one lightweight task. The task polls the
//! clock at a short fixed period, announces the remaining time at interval
//! boundaries and, once the round has run out of time, races for the single
//! [`Registry::close_and_remove`] transition. Only the winner of that race
//! hands the snapshot on for scoring.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::{
    registry::{Registry, Round},
    round_id::RoundId,
    session::CollaboratorError,
};

/// What a single poll of the clock calls for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Nothing to do
    Idle,
    /// A boundary was crossed; announce this much remaining time
    Announce(Duration),
    /// The round has run out of time
    Expired,
}

/// Decides which boundaries to announce
///
/// Boundaries are the multiples of the interval strictly below the timeout.
/// Each is reported at most once no matter how often the clock is polled;
/// when several are crossed between two polls only the latest is reported.
#[derive(Debug, Clone)]
pub struct CountdownTracker {
    timeout: Duration,
    interval: Duration,
    last_boundary: Option<u128>,
}

impl CountdownTracker {
    /// Creates a tracker for a round of length `timeout`
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            last_boundary: None,
        }
    }

    /// Evaluates the clock at `elapsed` since the round started
    pub fn tick(&mut self, elapsed: Duration) -> Tick {
        let remaining = self.timeout.saturating_sub(elapsed);
        if remaining.is_zero() {
            return Tick::Expired;
        }

        let interval = self.interval.as_millis();
        if interval == 0 {
            return Tick::Idle;
        }

        let boundary = remaining.as_millis().div_ceil(interval);
        let announced_at = boundary * interval;
        let is_new = self.last_boundary.is_none_or(|last| boundary < last);

        if announced_at < self.timeout.as_millis() && is_new {
            self.last_boundary = Some(boundary);
            u64::try_from(announced_at).map_or(Tick::Idle, |millis| {
                Tick::Announce(Duration::from_millis(millis))
            })
        } else {
            Tick::Idle
        }
    }
}

/// Receives what a countdown task produces
#[async_trait]
pub trait CountdownSink: Send + Sync + 'static {
    /// A boundary of `round` was crossed with `remaining` time left
    ///
    /// # Errors
    ///
    /// Delivery failures are logged by the task and never stop it.
    async fn countdown(&self, round_id: RoundId, remaining: Duration)
    -> Result<(), CollaboratorError>;

    /// The task won the closing race; `round` is the final snapshot
    ///
    /// # Errors
    ///
    /// Delivery failures are logged by the task.
    async fn expired(&self, round: Round) -> Result<(), CollaboratorError>;
}

/// Timing of a single countdown
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    /// When the round was created
    pub created_at: Instant,
    /// How long the round accepts submissions
    pub timeout: Duration,
    /// Spacing of the remaining-time announcements
    pub announce_interval: Duration,
    /// How often the clock is polled
    pub poll_interval: Duration,
}

/// Owner side of a running countdown task
#[derive(Debug)]
pub struct CountdownHandle {
    task: JoinHandle<()>,
}

impl CountdownHandle {
    /// Stops the task without touching its round
    ///
    /// The round stays in the registry and can still be finished directly.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Whether the task has stopped
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns the countdown task of `round_id`
pub fn spawn<S: CountdownSink>(
    registry: Arc<Mutex<Registry>>,
    sink: Arc<S>,
    round_id: RoundId,
    schedule: Schedule,
) -> CountdownHandle {
    CountdownHandle {
        task: tokio::spawn(run(registry, sink, round_id, schedule)),
    }
}

async fn run<S: CountdownSink>(
    registry: Arc<Mutex<Registry>>,
    sink: Arc<S>,
    round_id: RoundId,
    schedule: Schedule,
) {
    let mut tracker = CountdownTracker::new(schedule.timeout, schedule.announce_interval);
    let mut ticker = tokio::time::interval(schedule.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let elapsed = Instant::now().saturating_duration_since(schedule.created_at);
        match tracker.tick(elapsed) {
            Tick::Idle => {
                if !registry.lock().await.is_open(round_id) {
                    debug!(round = %round_id, "round gone, countdown stopping");
                    return;
                }
            }
            Tick::Announce(remaining) => {
                if !registry.lock().await.is_open(round_id) {
                    debug!(round = %round_id, "round gone, countdown stopping");
                    return;
                }
                if let Err(error) = sink.countdown(round_id, remaining).await {
                    warn!(round = %round_id, %error, "countdown announcement failed");
                }
            }
            Tick::Expired => {
                let snapshot = registry.lock().await.close_and_remove(round_id);
                match snapshot {
                    Some(round) => {
                        if let Err(error) = sink.expired(round).await {
                            warn!(round = %round_id, %error, "result announcement failed");
                        }
                    }
                    None => debug!(round = %round_id, "round already closed elsewhere"),
                }
                return;
            }
        }
    }
}
