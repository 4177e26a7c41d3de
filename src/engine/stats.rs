// src/engine/stats.rs

use crate::engine::registry::TaskRegistry;
use crate::protocol::message::STATS_SUBJECT;
use crate::protocol::StatsReport;

/// Counters accumulated between two maintenance sweeps.
///
/// Taking a report resets them; registry gauges are read at report time.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Stats {
    pub tasks_launched: u64,
    pub tasks_failed: u64,
    pub tasks_evicted: u64,
}

impl Stats {
    pub fn inc_launched(&mut self) {
        self.tasks_launched += 1;
    }

    pub fn inc_failed(&mut self) {
        self.tasks_failed += 1;
    }

    pub fn add_evicted(&mut self, n: usize) {
        self.tasks_evicted += n as u64;
    }

    pub fn take_report(&mut self, host: &str, registry: &TaskRegistry) -> StatsReport {
        let counters = std::mem::take(self);
        StatsReport {
            req: STATS_SUBJECT.to_string(),
            host: host.to_string(),
            tasks_launched: counters.tasks_launched,
            tasks_failed: counters.tasks_failed,
            tasks_evicted: counters.tasks_evicted,
            tasks_active: registry.active_count() as u64,
            tasks_stopped: registry.stopped_count() as u64,
            launches_in_flight: registry.launching_count() as u64,
        }
    }
}
