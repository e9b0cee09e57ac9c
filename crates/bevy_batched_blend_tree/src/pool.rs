//! Packed per-instance storage.
//!
//! Every per-instance array is an arena addressed by slot. Live instances always occupy slots
//! `0..active_count`; releasing an instance moves the last slot into the hole, and the
//! id -> slot table keeps external handles stable across that move.

use crate::{
    errors::{BlendTreeError, BlendTreeResult},
    handle::InstanceHandle,
    node_graph::NodeGraph,
};

/// Mutable view over one instance's slice of every per-instance array.
pub(crate) struct InstanceView<'a> {
    pub parameters: &'a [f32],
    pub weights: &'a mut [f32],
    pub blended_lengths: &'a mut [f32],
    pub normalized_time: &'a mut f32,
}

/// Read-only view over one slot, as consumed by propagation.
pub(crate) struct SlotState<'a, P> {
    pub normalized_time: f32,
    pub weights: &'a [f32],
    pub blended_lengths: &'a [f32],
    pub playables: &'a [Option<P>],
}

/// Backend resources released together with an instance.
pub(crate) struct ReleasedInstance<P, O> {
    pub output: Option<O>,
    pub playables: Vec<P>,
}

pub(crate) struct InstancePool<P, O> {
    node_count: usize,
    weight_count: usize,
    buffer_size: usize,

    weights: Vec<f32>,
    parameters: Vec<f32>,
    blended_lengths: Vec<f32>,
    normalized_times: Vec<f32>,
    playables: Vec<Option<P>>,
    outputs: Vec<Option<O>>,

    active_count: usize,
    free_ids: Vec<usize>,
    slot_lookup: Vec<Option<usize>>,
}

impl<P: Copy, O> InstancePool<P, O> {
    pub fn new(capacity: usize, graph: &NodeGraph) -> Self {
        let node_count = graph.len();
        let weight_count = graph.weight_count();
        let buffer_size = graph.buffer_size();

        Self {
            node_count,
            weight_count,
            buffer_size,

            weights: vec![0.; capacity * weight_count],
            parameters: vec![0.; capacity * buffer_size],
            blended_lengths: vec![0.; capacity * node_count],
            normalized_times: vec![0.; capacity],
            playables: vec![None; capacity * node_count],
            outputs: (0..capacity).map(|_| None).collect(),

            active_count: 0,
            // Popped from the back, so id 0 is handed out first.
            free_ids: (0..capacity).rev().collect(),
            slot_lookup: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slot_lookup.len()
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn is_full(&self) -> bool {
        self.free_ids.is_empty()
    }

    /// Slot currently holding the instance, `None` if the handle is not live.
    pub fn slot(&self, handle: InstanceHandle) -> Option<usize> {
        let id = handle.id()?;
        *self.slot_lookup.get(id)?
    }

    pub fn expect_slot(&self, handle: InstanceHandle) -> BlendTreeResult<usize> {
        self.slot(handle)
            .ok_or(BlendTreeError::InvalidHandle(handle))
    }

    /// Takes the next free id and claims slot `active_count` for it, with zeroed data.
    pub fn allocate(&mut self) -> BlendTreeResult<(InstanceHandle, usize)> {
        let id = self
            .free_ids
            .pop()
            .ok_or(BlendTreeError::PoolExhausted(self.capacity()))?;

        let slot = self.active_count;
        self.slot_lookup[id] = Some(slot);
        self.active_count += 1;
        self.clear_slot(slot);

        Ok((InstanceHandle::from_id(id), slot))
    }

    pub fn attach(&mut self, handle: InstanceHandle, playables: Vec<P>, output: O) {
        let (Some(id), Some(slot)) = (handle.id(), self.slot(handle)) else {
            return;
        };
        let range = self.node_range(slot);
        for (target, playable) in self.playables[range].iter_mut().zip(playables) {
            *target = Some(playable);
        }
        self.outputs[id] = Some(output);
    }

    /// Frees the instance and compacts the last slot into its place.
    pub fn release(&mut self, handle: InstanceHandle) -> BlendTreeResult<ReleasedInstance<P, O>> {
        let slot_to_remove = self.expect_slot(handle)?;
        let Some(id) = handle.id() else {
            return Err(BlendTreeError::InvalidHandle(handle));
        };

        let released = ReleasedInstance {
            output: self.outputs[id].take(),
            playables: self.playables[self.node_range(slot_to_remove)]
                .iter()
                .flatten()
                .copied()
                .collect(),
        };

        self.active_count -= 1;
        let last_slot = self.active_count;
        self.slot_lookup[id] = None;

        if let Some(moved) = self
            .slot_lookup
            .iter_mut()
            .find(|slot| **slot == Some(last_slot))
        {
            *moved = Some(slot_to_remove);
        }

        if slot_to_remove != last_slot {
            self.copy_slot(last_slot, slot_to_remove);
        }
        self.clear_slot(last_slot);
        self.free_ids.push(id);

        Ok(released)
    }

    fn weight_range(&self, slot: usize) -> std::ops::Range<usize> {
        slot * self.weight_count..(slot + 1) * self.weight_count
    }

    fn parameter_range(&self, slot: usize) -> std::ops::Range<usize> {
        slot * self.buffer_size..(slot + 1) * self.buffer_size
    }

    fn node_range(&self, slot: usize) -> std::ops::Range<usize> {
        slot * self.node_count..(slot + 1) * self.node_count
    }

    fn copy_slot(&mut self, from: usize, to: usize) {
        let (src, dst) = (self.weight_range(from), self.weight_range(to).start);
        self.weights.copy_within(src, dst);

        let (src, dst) = (self.parameter_range(from), self.parameter_range(to).start);
        self.parameters.copy_within(src, dst);

        let (src, dst) = (self.node_range(from), self.node_range(to).start);
        self.blended_lengths.copy_within(src.clone(), dst);
        self.playables.copy_within(src, dst);

        self.normalized_times[to] = self.normalized_times[from];
    }

    fn clear_slot(&mut self, slot: usize) {
        let range = self.weight_range(slot);
        self.weights[range].fill(0.);
        let range = self.parameter_range(slot);
        self.parameters[range].fill(0.);
        let range = self.node_range(slot);
        self.blended_lengths[range.clone()].fill(0.);
        self.playables[range].fill(None);
        self.normalized_times[slot] = 0.;
    }

    pub fn weights(&self, slot: usize) -> &[f32] {
        &self.weights[self.weight_range(slot)]
    }

    pub fn parameters(&self, slot: usize) -> &[f32] {
        &self.parameters[self.parameter_range(slot)]
    }

    pub fn parameters_mut(&mut self, slot: usize) -> &mut [f32] {
        let range = self.parameter_range(slot);
        &mut self.parameters[range]
    }

    pub fn blended_lengths(&self, slot: usize) -> &[f32] {
        &self.blended_lengths[self.node_range(slot)]
    }

    pub fn normalized_time(&self, slot: usize) -> f32 {
        self.normalized_times[slot]
    }

    pub fn slot_state(&self, slot: usize) -> SlotState<'_, P> {
        SlotState {
            normalized_time: self.normalized_times[slot],
            weights: self.weights(slot),
            blended_lengths: self.blended_lengths(slot),
            playables: &self.playables[self.node_range(slot)],
        }
    }

    /// Splits the packed arrays into one disjoint view per live slot.
    pub fn instance_views(&mut self) -> Vec<InstanceView<'_>> {
        let mut views = Vec::with_capacity(self.active_count);

        let mut parameters = &self.parameters[..self.active_count * self.buffer_size];
        let mut weights = &mut self.weights[..self.active_count * self.weight_count];
        let mut blended_lengths = &mut self.blended_lengths[..self.active_count * self.node_count];
        let times = &mut self.normalized_times[..self.active_count];

        for normalized_time in times.iter_mut() {
            let (instance_parameters, rest) = parameters.split_at(self.buffer_size);
            parameters = rest;
            let (instance_weights, rest) = std::mem::take(&mut weights).split_at_mut(self.weight_count);
            weights = rest;
            let (instance_lengths, rest) =
                std::mem::take(&mut blended_lengths).split_at_mut(self.node_count);
            blended_lengths = rest;

            views.push(InstanceView {
                parameters: instance_parameters,
                weights: instance_weights,
                blended_lengths: instance_lengths,
                normalized_time,
            });
        }

        views
    }

    /// Releases every live instance, leaving the pool empty.
    pub fn drain(&mut self) -> Vec<ReleasedInstance<P, O>> {
        let live: Vec<InstanceHandle> = self
            .slot_lookup
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(id, _)| InstanceHandle::from_id(id))
            .collect();

        live.into_iter()
            .filter_map(|handle| self.release(handle).ok())
            .collect()
    }
}
