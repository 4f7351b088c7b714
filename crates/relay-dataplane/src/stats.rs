//! Emitter Statistics
//!
//! Lock-free counters updated from every reading task.

use relay_common::AtomicCounter;

/// Per-emitter counters
#[derive(Debug, Default)]
pub struct EmitterStats {
    /// Records read from any input
    pub received: AtomicCounter,
    /// Records whose envelope did not decode
    pub malformed: AtomicCounter,
    /// Records dropped by the filter
    pub filtered: AtomicCounter,
    /// Records handed to at least one output
    pub forwarded: AtomicCounter,
    /// Successful output writes
    pub writes: AtomicCounter,
    /// Failed output writes
    pub write_failures: AtomicCounter,
    /// Inputs that ended on a read error
    pub read_failures: AtomicCounter,
    /// Reading tasks launched
    pub inputs_started: AtomicCounter,
    /// Reading tasks finished
    pub inputs_closed: AtomicCounter,
}

impl EmitterStats {
    /// Count a record read from an input
    #[inline(always)]
    pub fn record_received(&self) {
        self.received.inc();
    }

    /// Count a record dropped at decode
    #[inline(always)]
    pub fn record_malformed(&self) {
        self.malformed.inc();
    }

    /// Count a record dropped by the filter
    #[inline(always)]
    pub fn record_filtered(&self) {
        self.filtered.inc();
    }

    /// Count a record routed to outputs
    #[inline(always)]
    pub fn record_forwarded(&self) {
        self.forwarded.inc();
    }

    /// Count one output write outcome
    #[inline(always)]
    pub fn record_write(&self, ok: bool) {
        if ok {
            self.writes.inc();
        } else {
            self.write_failures.inc();
        }
    }

    /// Copy current values
    pub fn snapshot(&self) -> EmitterStatsSnapshot {
        EmitterStatsSnapshot {
            received: self.received.get(),
            malformed: self.malformed.get(),
            filtered: self.filtered.get(),
            forwarded: self.forwarded.get(),
            writes: self.writes.get(),
            write_failures: self.write_failures.get(),
            read_failures: self.read_failures.get(),
            inputs_started: self.inputs_started.get(),
            inputs_closed: self.inputs_closed.get(),
        }
    }
}

/// Stats snapshot (non-atomic)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitterStatsSnapshot {
    /// Records read from any input
    pub received: u64,
    /// Records whose envelope did not decode
    pub malformed: u64,
    /// Records dropped by the filter
    pub filtered: u64,
    /// Records handed to at least one output
    pub forwarded: u64,
    /// Successful output writes
    pub writes: u64,
    /// Failed output writes
    pub write_failures: u64,
    /// Inputs that ended on a read error
    pub read_failures: u64,
    /// Reading tasks launched
    pub inputs_started: u64,
    /// Reading tasks finished
    pub inputs_closed: u64,
}

impl EmitterStatsSnapshot {
    /// Inputs whose reading task is still alive
    pub fn active_inputs(&self) -> u64 {
        self.inputs_started.saturating_sub(self.inputs_closed)
    }

    /// Share of received records that were forwarded
    pub fn forward_rate(&self) -> f64 {
        if self.received == 0 {
            return 0.0;
        }
        self.forwarded as f64 / self.received as f64
    }
}
