//! Frame phase instrumentation.

use std::time::{Duration, Instant};

use bevy::log::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FramePhase {
    /// Weights, blended lengths and normalized time for every instance.
    Update,
    /// Writing results into the playback backend.
    Propagate,
    /// Backend evaluation.
    Evaluate,
}

impl FramePhase {
    pub const ALL: [FramePhase; 3] = [FramePhase::Update, FramePhase::Propagate, FramePhase::Evaluate];

    const fn slot(self) -> usize {
        match self {
            FramePhase::Update => 0,
            FramePhase::Propagate => 1,
            FramePhase::Evaluate => 2,
        }
    }
}

/// Receives phase boundaries from [`BatchedBlendTree::simulate`].
///
/// [`BatchedBlendTree::simulate`]: crate::engine::BatchedBlendTree::simulate
pub trait FrameObserver: Send + Sync {
    fn begin(&mut self, _phase: FramePhase) {}
    fn end(&mut self, _phase: FramePhase) {}
}

#[derive(Default)]
pub struct NoopObserver;

impl FrameObserver for NoopObserver {}

/// Measures wall time per phase and reports it with `trace!`.
#[derive(Default, Debug)]
pub struct TimingObserver {
    started: [Option<Instant>; 3],
    last: [Duration; 3],
}

impl TimingObserver {
    /// Duration of `phase` in the most recently completed frame.
    pub fn last(&self, phase: FramePhase) -> Duration {
        self.last[phase.slot()]
    }
}

impl FrameObserver for TimingObserver {
    fn begin(&mut self, phase: FramePhase) {
        self.started[phase.slot()] = Some(Instant::now());
    }

    fn end(&mut self, phase: FramePhase) {
        let Some(started) = self.started[phase.slot()].take() else {
            return;
        };
        let elapsed = started.elapsed();
        self.last[phase.slot()] = elapsed;
        trace!("Blend tree {:?} took {:?}", phase, elapsed);
    }
}
