//! Leader Schedule Gate - Advisory Slot Filter
//!
//! Before spending the correlation budget on a launch, the pipeline can
//! check whether a cooperating block producer leads the launch slot or
//! the one after it. The set of covered slots is replaced out-of-band;
//! this module only answers `should_attempt`.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

/// Advisory predicate consulted before correlation.
pub trait LeaderGate: Send + Sync + 'static {
    /// `true` if a correlation attempt is worth making for `slot`.
    fn should_attempt(&self, slot: u64) -> bool;
}

/// Disabled gate: every slot passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAttempt;

impl LeaderGate for AlwaysAttempt {
    fn should_attempt(&self, _slot: u64) -> bool {
        true
    }
}

/// Slots covered by cooperating producers in the current epoch.
///
/// Read-only from the pipeline's point of view; `replace` swaps the whole
/// set when a refresh lands.
#[derive(Debug, Default)]
pub struct LeaderScheduleSet {
    slots: RwLock<Arc<HashSet<u64>>>,
}

impl LeaderScheduleSet {
    /// Create an empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the known slots with a fresh refresh result.
    pub fn replace<I: IntoIterator<Item = u64>>(&self, slots: I) {
        let fresh: HashSet<u64> = slots.into_iter().collect();
        *self.slots.write() = Arc::new(fresh);
    }

    /// Whether `slot` is covered.
    pub fn contains(&self, slot: u64) -> bool {
        self.slots.read().contains(&slot)
    }

    /// Number of covered slots.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether no slots are known.
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

/// Enabled gate backed by a `LeaderScheduleSet`.
#[derive(Debug, Clone)]
pub struct ScheduleGate {
    schedule: Arc<LeaderScheduleSet>,
}

impl ScheduleGate {
    /// Wrap a shared schedule.
    pub fn new(schedule: Arc<LeaderScheduleSet>) -> Self {
        Self { schedule }
    }
}

impl LeaderGate for ScheduleGate {
    fn should_attempt(&self, slot: u64) -> bool {
        self.schedule.contains(slot) || self.schedule.contains(slot.saturating_add(1))
    }
}
