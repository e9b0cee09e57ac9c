//! Per-frame evaluation of every live instance.

use bevy::{
    math::Vec2,
    tasks::{ComputeTaskPool, TaskPool},
};

use crate::{
    blend_weights::{freeform_cartesian_weights, linear_weights, state_blend_weights},
    node_graph::{NodeGraph, NodeType},
    pool::InstanceView,
    settings::{Execution, TimeWrap},
};

/// Frame inputs shared by every instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTime {
    pub time: f32,
    pub delta_time: f32,
    pub time_wrap: TimeWrap,
}

/// Solves the child weights of every operator node from one instance's parameter buffer.
pub fn evaluate_weights(graph: &NodeGraph, time: f32, parameters: &[f32], weights: &mut [f32]) {
    for node in graph.nodes() {
        let node_weights = &mut weights[node.child_weights()];
        let node_parameters = &parameters[node.parameters()];

        match node.ty {
            NodeType::Clip => {}
            NodeType::BlendStates => {
                let from = node_parameters[0] as usize;
                let to = node_parameters[1] as usize;
                let transition_start = node_parameters[2];
                let transition_duration = node_parameters[3];
                state_blend_weights(
                    from,
                    to,
                    transition_start,
                    transition_duration,
                    time,
                    node_weights,
                );
            }
            NodeType::BlendLinear => {
                linear_weights(node_parameters[0], graph.positions_1d(node), node_weights);
            }
            NodeType::BlendFreeform2D => {
                let parameter = Vec2::new(node_parameters[0], node_parameters[1]);
                freeform_cartesian_weights(parameter, graph.positions_2d(node), node_weights);
            }
        }
    }
}

/// Children-first pass computing each node's effective duration.
pub fn evaluate_blended_lengths(graph: &NodeGraph, weights: &[f32], blended_lengths: &mut [f32]) {
    // Breadth-first layout puts every child after its parent.
    for (index, node) in graph.nodes().iter().enumerate().rev() {
        let length = if node.is_clip() {
            node.length
        } else {
            node.children()
                .zip(&weights[node.child_weights()])
                .map(|(child, weight)| blended_lengths[child] * weight)
                .sum()
        };
        blended_lengths[index] = length;
    }
}

impl InstanceView<'_> {
    fn update(&mut self, graph: &NodeGraph, frame: FrameTime) {
        evaluate_weights(graph, frame.time, self.parameters, self.weights);
        evaluate_blended_lengths(graph, &*self.weights, self.blended_lengths);

        let root_length = self.blended_lengths.first().copied().unwrap_or(0.);
        if root_length > 0. && root_length.is_finite() {
            *self.normalized_time =
                frame.time_wrap.apply(*self.normalized_time + frame.delta_time / root_length);
        }
    }
}

/// Runs the update for every view, serially or one task per batch of instances.
pub(crate) fn update_instances(
    graph: &NodeGraph,
    mut views: Vec<InstanceView<'_>>,
    frame: FrameTime,
    execution: Execution,
) {
    match execution {
        Execution::Serial => {
            for view in &mut views {
                view.update(graph, frame);
            }
        }
        Execution::Parallel { batch_size } => {
            let task_pool = ComputeTaskPool::get_or_init(TaskPool::default);
            let views = views.as_mut_slice();
            task_pool.scope(|scope| {
                for batch in views.chunks_mut(batch_size.max(1)) {
                    scope.spawn(async move {
                        for view in batch {
                            view.update(graph, frame);
                        }
                    });
                }
            });
        }
    }
}
