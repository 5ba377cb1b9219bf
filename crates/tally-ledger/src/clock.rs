//! Cycle clock: maps wall-clock time to cycle indices.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use tally_core::traits::Clock;
use tally_core::types::Cycle;

/// Wall clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Clock that only moves when told to. Used by tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// `cycle = floor((now - genesis_time) / cycle_length)`, zero before genesis.
#[derive(Clone)]
pub struct CycleClock {
    genesis_time: i64,
    cycle_length: u64,
    clock: Arc<dyn Clock>,
}

impl CycleClock {
    /// A zero `cycle_length` is treated as one second.
    pub fn new(genesis_time: i64, cycle_length: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            genesis_time,
            cycle_length: cycle_length.max(1),
            clock,
        }
    }

    /// Current Unix time from the underlying clock.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Cycle containing timestamp `ts`.
    pub fn cycle_at(&self, ts: i64) -> Cycle {
        if ts <= self.genesis_time {
            return 0;
        }
        let elapsed = (ts as i128 - self.genesis_time as i128) as u128;
        (elapsed / self.cycle_length as u128) as Cycle
    }

    /// Cycle containing the current time.
    pub fn current_cycle(&self) -> Cycle {
        self.cycle_at(self.now())
    }

    /// Timestamp at which `cycle` starts (saturating).
    pub fn cycle_start(&self, cycle: Cycle) -> i64 {
        let offset = (cycle as i128).saturating_mul(self.cycle_length as i128);
        (self.genesis_time as i128 + offset).min(i64::MAX as i128) as i64
    }

    pub fn cycle_length(&self) -> u64 {
        self.cycle_length
    }
}

impl fmt::Debug for CycleClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CycleClock")
            .field("genesis_time", &self.genesis_time)
            .field("cycle_length", &self.cycle_length)
            .field("now", &self.now())
            .finish()
    }
}
