use bevy::reflect::{Reflect, std_traits::ReflectDefault};
use serde::{Deserialize, Serialize};

/// How the batched update is scheduled across instances.
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[reflect(Default)]
pub enum Execution {
    #[default]
    Serial,
    /// Instances are split into batches of `batch_size`, one task per batch, on bevy's
    /// compute task pool.
    Parallel { batch_size: usize },
}

/// Traversal used to push weights and times into the playback backend.
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[reflect(Default)]
pub enum PropagationMode {
    /// Scan every node, skipping nodes whose own weight is zero.
    #[default]
    Flat,
    /// Depth-first from the root, not descending into zero-weight subtrees.
    Recursive,
}

/// What happens to normalized time once it leaves `[0, 1)`.
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[reflect(Default)]
pub enum TimeWrap {
    /// Left as is; the backend is expected to loop its clips.
    Unbounded,
    #[default]
    Wrap,
    Clamp,
}

impl TimeWrap {
    pub fn apply(self, normalized_time: f32) -> f32 {
        match self {
            TimeWrap::Unbounded => normalized_time,
            TimeWrap::Wrap => normalized_time.rem_euclid(1.),
            TimeWrap::Clamp => normalized_time.clamp(0., 1.),
        }
    }
}

#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[reflect(Default)]
#[serde(default)]
pub struct SimulateSettings {
    pub execution: Execution,
    pub propagation: PropagationMode,
    pub time_wrap: TimeWrap,
}

impl SimulateSettings {
    pub fn parallel(mut self, batch_size: usize) -> Self {
        self.execution = Execution::Parallel { batch_size };
        self
    }

    pub fn recursive(mut self) -> Self {
        self.propagation = PropagationMode::Recursive;
        self
    }

    pub fn with_time_wrap(mut self, time_wrap: TimeWrap) -> Self {
        self.time_wrap = time_wrap;
        self
    }
}
