//! Daily update scheduler.
//!
//! Runs one cycle as soon as it starts, then sleeps until the next
//! occurrence of the configured wall-clock time. Cycles never overlap: the
//! next slot is computed from the moment a cycle finishes, so an overrun
//! skips the slots it missed. A failed cycle is logged and the schedule
//! carries on.

use crate::config::ScheduleTimezone;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, LocalResult, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, instrument};

/// Longest single sleep, so wall-clock jumps (suspend, manual changes) are noticed
const MAX_SLEEP_CHUNK: Duration = Duration::from_secs(15 * 60);

/// Observable scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchedulerState {
    Idle { next_run: DateTime<Utc> },
    Running { started_at: DateTime<Utc> },
    Stopped,
}

/// Source of time for the scheduler
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Resolve once `now() >= deadline`
    async fn sleep_until(&self, deadline: DateTime<Utc>);
}

/// Wall clock backed by `tokio::time`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        loop {
            let Ok(remaining) = (deadline - Utc::now()).to_std() else {
                return;
            };
            if remaining.is_zero() {
                return;
            }
            tokio::time::sleep(remaining.min(MAX_SLEEP_CHUNK)).await;
        }
    }
}

/// One update cycle, run by the scheduler
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self) -> Result<()>;
}

/// Next time the wall clock in `after`'s timezone reads `at`, strictly after `after`.
///
/// A time skipped by a DST jump resolves to the first valid instant after it;
/// a repeated time resolves to its earlier occurrence.
pub fn next_occurrence<Tz: TimeZone>(after: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = after.timezone();
    let mut date = after.date_naive();

    loop {
        let naive = date.and_time(at);
        let resolved = match tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Some(dt),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => (1..=12)
                .map(|quarters| naive + chrono::Duration::minutes(15 * quarters))
                .find_map(|shifted| tz.from_local_datetime(&shifted).earliest()),
        };

        if let Some(candidate) = resolved {
            if candidate > *after {
                return candidate;
            }
        }

        date = match date.succ_opt() {
            Some(next) => next,
            None => return after.clone() + chrono::Duration::days(1),
        };
    }
}

/// Next scheduled run after `now`, in UTC
#[must_use]
pub fn next_run_after(
    now: DateTime<Utc>,
    at: NaiveTime,
    timezone: ScheduleTimezone,
) -> DateTime<Utc> {
    match timezone {
        ScheduleTimezone::Utc => next_occurrence(&now, at),
        ScheduleTimezone::Local => {
            next_occurrence(&now.with_timezone(&Local), at).with_timezone(&Utc)
        }
    }
}

/// Runs cycles immediately and then daily until shutdown
pub struct UpdateScheduler {
    runner: Arc<dyn CycleRunner>,
    clock: Arc<dyn Clock>,
    run_at: NaiveTime,
    timezone: ScheduleTimezone,
    state_tx: watch::Sender<SchedulerState>,
}

impl UpdateScheduler {
    #[must_use]
    pub fn new(
        runner: Arc<dyn CycleRunner>,
        clock: Arc<dyn Clock>,
        run_at: NaiveTime,
        timezone: ScheduleTimezone,
    ) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Idle {
            next_run: clock.now(),
        });
        Self {
            runner,
            clock,
            run_at,
            timezone,
            state_tx,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    /// Receiver that sees every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: SchedulerState) {
        self.state_tx.send_replace(state);
    }

    /// Run until `shutdown` turns true (or its sender is dropped).
    ///
    /// Shutdown during a sleep returns at once; shutdown during a cycle
    /// returns after the cycle completes. Returns the number of cycles run.
    #[instrument(skip_all, fields(run_at = %self.run_at, timezone = ?self.timezone))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut cycles = 0u64;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started_at = self.clock.now();
            self.set_state(SchedulerState::Running { started_at });
            info!("Starting update cycle");

            match self.runner.run_cycle().await {
                Ok(()) => info!("Update cycle completed"),
                Err(e) => error!("Update cycle failed: {}", e),
            }
            cycles += 1;

            if *shutdown.borrow() {
                break;
            }

            let next_run = next_run_after(self.clock.now(), self.run_at, self.timezone);
            self.set_state(SchedulerState::Idle { next_run });
            info!("Next update scheduled for {}", next_run);

            tokio::select! {
                () = self.clock.sleep_until(next_run) => {}
                () = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        self.set_state(SchedulerState::Stopped);
        info!("Scheduler stopped after {} cycles", cycles);
        cycles
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
