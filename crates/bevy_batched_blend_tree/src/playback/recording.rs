use bevy::log::debug;

use super::PlaybackBackend;
use crate::node_graph::ClipRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlayableId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutputId(usize);

#[derive(Clone, Debug, PartialEq)]
pub enum PlayableKind {
    Clip(ClipRef),
    Mixer(Vec<PlayableId>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedPlayable {
    pub kind: PlayableKind,
    pub time: f32,
    pub input_weights: Vec<f32>,
    /// Number of times the engine wrote this playable's time.
    pub writes: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedOutput<T> {
    pub target: T,
    pub root: PlayableId,
}

/// In-memory backend that stores whatever the engine writes into it.
///
/// Useful as a reference sink for tooling and for inspecting propagation.
#[derive(Debug)]
pub struct RecordingBackend<T> {
    playables: Vec<Option<RecordedPlayable>>,
    outputs: Vec<Option<RecordedOutput<T>>>,
    evaluations: usize,
}

impl<T> Default for RecordingBackend<T> {
    fn default() -> Self {
        Self {
            playables: Vec::new(),
            outputs: Vec::new(),
            evaluations: 0,
        }
    }
}

impl<T> RecordingBackend<T> {
    pub fn playable(&self, id: PlayableId) -> Option<&RecordedPlayable> {
        self.playables.get(id.0)?.as_ref()
    }

    pub fn output(&self, id: OutputId) -> Option<&RecordedOutput<T>> {
        self.outputs.get(id.0)?.as_ref()
    }

    pub fn live_outputs(&self) -> usize {
        self.outputs.iter().flatten().count()
    }

    pub fn live_playables(&self) -> usize {
        self.playables.iter().flatten().count()
    }

    /// How many times [`PlaybackBackend::evaluate`] ran.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    fn push_playable(&mut self, kind: PlayableKind, inputs: usize) -> PlayableId {
        self.playables.push(Some(RecordedPlayable {
            kind,
            time: 0.,
            input_weights: vec![0.; inputs],
            writes: 0,
        }));
        PlayableId(self.playables.len() - 1)
    }
}

impl<T> PlaybackBackend for RecordingBackend<T> {
    type Target = T;
    type Playable = PlayableId;
    type Output = OutputId;

    fn create_clip(&mut self, clip: &ClipRef) -> PlayableId {
        self.push_playable(PlayableKind::Clip(clip.clone()), 0)
    }

    fn create_mixer(&mut self, inputs: &[PlayableId]) -> PlayableId {
        self.push_playable(PlayableKind::Mixer(inputs.to_vec()), inputs.len())
    }

    fn create_output(&mut self, target: T, root: PlayableId) -> OutputId {
        self.outputs.push(Some(RecordedOutput { target, root }));
        OutputId(self.outputs.len() - 1)
    }

    fn destroy_output(&mut self, output: OutputId, playables: &[PlayableId]) {
        if let Some(slot) = self.outputs.get_mut(output.0) {
            *slot = None;
        }
        for playable in playables {
            if let Some(slot) = self.playables.get_mut(playable.0) {
                *slot = None;
            }
        }
    }

    fn set_time(&mut self, playable: PlayableId, time: f32) {
        if let Some(Some(recorded)) = self.playables.get_mut(playable.0) {
            recorded.time = time;
            recorded.writes += 1;
        }
    }

    fn set_input_weight(&mut self, playable: PlayableId, input: usize, weight: f32) {
        if let Some(Some(recorded)) = self.playables.get_mut(playable.0)
            && let Some(slot) = recorded.input_weights.get_mut(input)
        {
            *slot = weight;
        }
    }

    fn evaluate(&mut self) {
        self.evaluations += 1;
        debug!(
            "Evaluated {} outputs over {} playables",
            self.live_outputs(),
            self.live_playables()
        );
    }
}
