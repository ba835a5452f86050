//! Timing hooks for the per-frame pipeline.
//!
//! The instance reports how long each phase took to an injected [`PhaseObserver`]. Nothing is
//! printed or aggregated here; hosts decide what to do with the samples.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsCfg {
    pub enabled: bool,
}

impl Default for DiagnosticsCfg {
    fn default() -> Self {
        DiagnosticsCfg { enabled: false }
    }
}

/// Pipeline phases reported to observers, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Animator change and rebuild checks.
    Prepare,
    /// Bone/VPS state list rebuild.
    Mappings,
    /// Rule list rebuild and parameter refresh.
    Rules,
    /// Controller state evaluation and component read.
    Controllers,
    ApplyRules,
    WriteBack,
}

pub trait PhaseObserver: Send + Sync {
    fn phase_finished(&self, phase: Phase, elapsed: Duration);
}

/// Observer that drops every sample.
#[derive(Debug, Default)]
pub struct NullObserver;

impl PhaseObserver for NullObserver {
    fn phase_finished(&self, _phase: Phase, _elapsed: Duration) {}
}

/// Observer that keeps every sample; handy in tests and tooling.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    samples: Mutex<Vec<(Phase, Duration)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<(Phase, Duration)> {
        self.samples
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.samples().into_iter().map(|(p, _)| p).collect()
    }
}

impl PhaseObserver for RecordingObserver {
    fn phase_finished(&self, phase: Phase, elapsed: Duration) {
        let mut samples = self
            .samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        samples.push((phase, elapsed));
    }
}

/// Measures one phase when diagnostics are enabled and an observer is present.
pub(crate) struct PhaseTimer<'a> {
    observer: Option<&'a dyn PhaseObserver>,
    phase: Phase,
    start: Instant,
}

impl<'a> PhaseTimer<'a> {
    pub(crate) fn start(observer: Option<&'a dyn PhaseObserver>, phase: Phase) -> Self {
        Self {
            observer,
            phase,
            start: Instant::now(),
        }
    }
}

impl Drop for PhaseTimer<'_> {
    fn drop(&mut self) {
        if let Some(observer) = self.observer {
            observer.phase_finished(self.phase, self.start.elapsed());
        }
    }
}
