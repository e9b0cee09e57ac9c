//! Boundary with the animation-sampling backend.
//!
//! The engine never samples clips itself. Each instance owns one backend playable per node,
//! wired into a mixer tree mirroring the node graph, and every frame the engine writes the
//! node's local time and its children's input weights into those playables.

mod recording;

pub use recording::*;

use crate::{
    node_graph::{ClipRef, NodeGraph, NodeIndex},
    pool::{InstancePool, SlotState},
    settings::PropagationMode,
};

pub trait PlaybackBackend {
    /// What a new instance is bound to, e.g. the entity whose skeleton it animates.
    type Target;
    type Playable: Copy;
    type Output;

    fn create_clip(&mut self, clip: &ClipRef) -> Self::Playable;
    /// Creates a mixer whose input `i` is connected to `inputs[i]`.
    fn create_mixer(&mut self, inputs: &[Self::Playable]) -> Self::Playable;
    fn create_output(&mut self, target: Self::Target, root: Self::Playable) -> Self::Output;
    /// Releases an instance's output and every playable created for it.
    fn destroy_output(&mut self, output: Self::Output, playables: &[Self::Playable]);

    fn set_time(&mut self, playable: Self::Playable, time: f32);
    fn set_input_weight(&mut self, playable: Self::Playable, input: usize, weight: f32);

    /// Samples and applies every output, after propagation has finished.
    fn evaluate(&mut self);
}

/// Builds the playables of one instance, children before parents.
pub(crate) fn build_playables<B: PlaybackBackend>(
    graph: &NodeGraph,
    backend: &mut B,
) -> Vec<B::Playable> {
    let mut built: Vec<Option<B::Playable>> = vec![None; graph.len()];

    for (index, node) in graph.nodes().iter().enumerate().rev() {
        let playable = match graph.clip(NodeIndex::new(index)) {
            Some(clip) => backend.create_clip(clip),
            None => {
                let inputs: Vec<B::Playable> =
                    built[node.children()].iter().flatten().copied().collect();
                backend.create_mixer(&inputs)
            }
        };
        built[index] = Some(playable);
    }

    built.into_iter().flatten().collect()
}

/// Writes every live instance's results into the backend.
pub(crate) fn propagate<B: PlaybackBackend>(
    graph: &NodeGraph,
    pool: &InstancePool<B::Playable, B::Output>,
    backend: &mut B,
    mode: PropagationMode,
) {
    for slot in 0..pool.active_count() {
        let state = pool.slot_state(slot);
        match mode {
            PropagationMode::Flat => propagate_flat(graph, &state, backend),
            PropagationMode::Recursive => propagate_subtree(graph, &state, backend, 0),
        }
    }
}

fn propagate_flat<B: PlaybackBackend>(
    graph: &NodeGraph,
    state: &SlotState<'_, B::Playable>,
    backend: &mut B,
) {
    for index in 0..graph.len() {
        if index != 0 && state.weights[index - 1] == 0. {
            continue;
        }
        write_node(graph, state, backend, index);
    }
}

fn propagate_subtree<B: PlaybackBackend>(
    graph: &NodeGraph,
    state: &SlotState<'_, B::Playable>,
    backend: &mut B,
    index: usize,
) {
    write_node(graph, state, backend, index);

    for child in graph.nodes()[index].children() {
        if state.weights[child - 1] == 0. {
            continue;
        }
        propagate_subtree(graph, state, backend, child);
    }
}

fn write_node<B: PlaybackBackend>(
    graph: &NodeGraph,
    state: &SlotState<'_, B::Playable>,
    backend: &mut B,
    index: usize,
) {
    let Some(playable) = state.playables[index] else {
        return;
    };
    let node = &graph.nodes()[index];

    backend.set_time(
        playable,
        state.normalized_time * state.blended_lengths[index],
    );
    for (input, weight) in state.weights[node.child_weights()].iter().enumerate() {
        backend.set_input_weight(playable, input, *weight);
    }
}
