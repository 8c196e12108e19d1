//! Slot-targeted scheduling
//!
//! Consensus time is divided into 12 second slots grouped into 32-slot
//! epochs. A run can be pinned to slot positions within the epoch: the
//! scheduler sleeps until the next start of each requested slot and then
//! triggers one dispatch cycle.

use crate::error::SpammerResult;

use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

pub const SECONDS_PER_SLOT: u64 = 12;
pub const SLOTS_PER_EPOCH: u64 = 32;
pub const SECONDS_PER_EPOCH: u64 = SECONDS_PER_SLOT * SLOTS_PER_EPOCH;

/// Seconds from `now` until the next start of `target_slot` (epoch-relative).
///
/// Lands exactly on a slot boundary. A target that starts right now, or has
/// already started, is scheduled one epoch later.
pub fn seconds_until_slot(now: u64, genesis: u64, target_slot: u8) -> u64 {
    let target = i64::from(target_slot) % SLOTS_PER_EPOCH as i64;

    if now < genesis {
        return genesis - now + target as u64 * SECONDS_PER_SLOT;
    }

    let since_genesis = (now - genesis) as i64;
    let slot = SECONDS_PER_SLOT as i64;
    let epoch = SECONDS_PER_EPOCH as i64;

    let current_epoch_slot = (since_genesis / slot) % SLOTS_PER_EPOCH as i64;
    let since_epoch_start = since_genesis % epoch;

    let mut wait = (target - current_epoch_slot).rem_euclid(SLOTS_PER_EPOCH as i64) * slot
        - since_epoch_start % slot;
    if wait <= 0 {
        wait += epoch;
    }
    wait as u64
}

/// Current unix time in milliseconds
pub fn now_unix_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Sleep from `now_millis` until the next start of `target_slot`.
///
/// The whole-second wait is taken from the floored clock, so the sub-second
/// part already elapsed is subtracted to land on the boundary itself.
pub fn sleep_until_slot(now_millis: u64, genesis: u64, target_slot: u8) -> Duration {
    let wait_secs = seconds_until_slot(now_millis / 1000, genesis, target_slot);
    Duration::from_secs(wait_secs).saturating_sub(Duration::from_millis(now_millis % 1000))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    WaitingForSlot { slot: u8, wait: Duration },
    Dispatching { slot: u8 },
    /// Every target has been dispatched
    Finished,
}

/// Walks the configured slot targets in order
pub struct Scheduler {
    genesis_time: u64,
    targets: Vec<u8>,
    next_target: usize,
    state: SchedulerState,
    /// Unix time in milliseconds
    clock: fn() -> u64,
}

impl Scheduler {
    pub fn new(genesis_time: u64, targets: Vec<u8>) -> Self {
        Self {
            genesis_time,
            targets,
            next_target: 0,
            state: SchedulerState::Idle,
            clock: now_unix_millis,
        }
    }

    /// Replace the wall clock (unix milliseconds), e.g. with a fixed instant
    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Wait for each target slot in turn and run `cycle` once per target.
    ///
    /// A failing cycle stops the schedule and is returned as-is.
    pub async fn run<F, Fut, T>(&mut self, mut cycle: F) -> SpammerResult<Vec<T>>
    where
        F: FnMut(u8) -> Fut,
        Fut: Future<Output = SpammerResult<T>>,
    {
        let mut outputs = Vec::with_capacity(self.targets.len());

        while let Some(&slot) = self.targets.get(self.next_target) {
            let wait = sleep_until_slot((self.clock)(), self.genesis_time, slot);
            let wait_secs = wait.as_secs_f64();
            self.state = SchedulerState::WaitingForSlot { slot, wait };
            crate::metrics::record_slot_wait(wait_secs);
            info!(slot, wait_secs, "Waiting for slot");

            tokio::time::sleep(wait).await;

            self.state = SchedulerState::Dispatching { slot };
            debug!(slot, "Slot reached");
            outputs.push(cycle(slot).await?);

            self.next_target += 1;
            self.state = SchedulerState::Idle;
        }

        self.state = SchedulerState::Finished;
        Ok(outputs)
    }
}
