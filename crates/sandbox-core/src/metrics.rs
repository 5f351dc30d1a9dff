//! Gauge reporting and per-action timing.

use std::time::Instant;

/// Point-in-time counts reported after every successful create/delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaugeSnapshot {
    pub session_id: String,
    /// Instances currently in the session.
    pub instances: usize,
    /// Live terminal connections across all sessions.
    pub terminals: usize,
}

pub trait Gauges: Send + Sync {
    fn record(&self, snapshot: &GaugeSnapshot);
}

/// Discards every snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGauges;

impl Gauges for NoopGauges {
    fn record(&self, _snapshot: &GaugeSnapshot) {}
}

/// Logs how long an action took when dropped.
pub(crate) struct ActionTimer {
    action: &'static str,
    started: Instant,
}

impl ActionTimer {
    pub(crate) fn start(action: &'static str) -> Self {
        Self {
            action,
            started: Instant::now(),
        }
    }
}

impl Drop for ActionTimer {
    fn drop(&mut self) {
        tracing::debug!(
            action = self.action,
            elapsed_us = self.started.elapsed().as_micros() as u64,
            "action finished"
        );
    }
}
