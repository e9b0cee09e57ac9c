use bevy::{
    log::{debug, error, info},
    math::Vec2,
};

use crate::{
    errors::{BlendTreeError, BlendTreeResult},
    handle::InstanceHandle,
    node_graph::{Node, NodeGraph, NodeIndex, NodeType},
    observer::{FrameObserver, FramePhase, NoopObserver},
    playback::{PlaybackBackend, build_playables, propagate},
    pool::InstancePool,
    settings::{Execution, PropagationMode, SimulateSettings},
    tree::TreeNode,
    update::{FrameTime, update_instances},
};

/// Evaluates many instances of one blend tree in lockstep.
///
/// A frame is driven in three phases which must not overlap: write instance parameters with
/// the `set_*` methods, then call [`simulate`](Self::simulate) (or [`update`](Self::update)
/// followed by [`propagate`](Self::propagate)).
pub struct BatchedBlendTree<B: PlaybackBackend> {
    graph: NodeGraph,
    pool: InstancePool<B::Playable, B::Output>,
    backend: B,
    observer: Box<dyn FrameObserver>,
}

impl<B: PlaybackBackend> BatchedBlendTree<B> {
    /// Flattens `root` and allocates storage for up to `max_instances` live instances.
    pub fn new(max_instances: usize, root: &TreeNode, backend: B) -> BlendTreeResult<Self> {
        let graph = NodeGraph::from_tree(root)?;
        Self::from_graph(max_instances, graph, backend)
    }

    pub fn from_graph(max_instances: usize, graph: NodeGraph, backend: B) -> BlendTreeResult<Self> {
        if max_instances == 0 {
            return Err(BlendTreeError::ZeroCapacity);
        }
        if graph.is_empty() {
            return Err(BlendTreeError::EmptyGraph);
        }

        info!(
            "Created batched blend tree with {} nodes, {} parameter floats per instance and room for {} instances",
            graph.len(),
            graph.buffer_size(),
            max_instances
        );

        Ok(Self {
            pool: InstancePool::new(max_instances, &graph),
            graph,
            backend,
            observer: Box::new(NoopObserver),
        })
    }

    pub fn with_observer(mut self, observer: impl FrameObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn active_count(&self) -> usize {
        self.pool.active_count()
    }

    /// Resolves a node by name. Misses are logged and yield `None`.
    pub fn resolve_node_index(&self, name: &str) -> Option<NodeIndex> {
        let index = self.graph.find(name);
        if index.is_none() {
            error!("Blend tree node {:?} not found", name);
        }
        index
    }

    pub fn create_instance(&mut self, target: B::Target) -> BlendTreeResult<InstanceHandle> {
        if self.pool.is_full() {
            return Err(BlendTreeError::PoolExhausted(self.pool.capacity()));
        }

        let playables = build_playables(&self.graph, &mut self.backend);
        let Some(&root) = playables.first() else {
            return Err(BlendTreeError::EmptyGraph);
        };
        let output = self.backend.create_output(target, root);

        let (handle, slot) = match self.pool.allocate() {
            Ok(allocated) => allocated,
            Err(err) => {
                self.backend.destroy_output(output, &playables);
                return Err(err);
            }
        };
        self.pool.attach(handle, playables, output);

        debug!("Created blend tree instance {:?} in slot {}", handle, slot);
        Ok(handle)
    }

    pub fn destroy_instance(&mut self, handle: InstanceHandle) -> BlendTreeResult<()> {
        let released = self.pool.release(handle)?;
        if let Some(output) = released.output {
            self.backend.destroy_output(output, &released.playables);
        }

        debug!("Destroyed blend tree instance {:?}", handle);
        Ok(())
    }

    pub fn is_alive(&self, handle: InstanceHandle) -> bool {
        self.pool.slot(handle).is_some()
    }

    /// Current dense slot of a live instance. Slots move when other instances are destroyed.
    pub fn slot(&self, handle: InstanceHandle) -> Option<usize> {
        self.pool.slot(handle)
    }

    fn expect_node(&self, index: NodeIndex, expected: NodeType) -> BlendTreeResult<Node> {
        let node = *self
            .graph
            .node(index)
            .ok_or(BlendTreeError::NodeOutOfRange {
                index: index.index(),
                len: self.graph.len(),
            })?;

        if node.ty != expected {
            return Err(BlendTreeError::NodeTypeMismatch {
                index: index.index(),
                expected,
                found: node.ty,
            });
        }

        Ok(node)
    }

    /// Starts a cross-fade to `new_state`. Does nothing if it is already the target state.
    pub fn set_state_transition(
        &mut self,
        handle: InstanceHandle,
        index: NodeIndex,
        new_state: usize,
        transition_duration: f32,
        current_time: f32,
    ) -> BlendTreeResult<()> {
        let node = self.expect_node(index, NodeType::BlendStates)?;
        if !transition_duration.is_finite() || !current_time.is_finite() {
            return Err(BlendTreeError::NonFiniteParameter {
                index: index.index(),
            });
        }
        if new_state >= node.child_count {
            return Err(BlendTreeError::StateOutOfRange {
                index: index.index(),
                state: new_state,
                count: node.child_count,
            });
        }
        let slot = self.pool.expect_slot(handle)?;

        let region = &mut self.pool.parameters_mut(slot)[node.parameters()];
        let new_state = new_state as f32;
        if region[1] == new_state {
            return Ok(());
        }

        region[0] = region[1];
        region[1] = new_state;
        region[2] = current_time;
        region[3] = transition_duration;
        Ok(())
    }

    pub fn set_linear_parameter(
        &mut self,
        handle: InstanceHandle,
        index: NodeIndex,
        value: f32,
    ) -> BlendTreeResult<()> {
        let node = self.expect_node(index, NodeType::BlendLinear)?;
        if !value.is_finite() {
            return Err(BlendTreeError::NonFiniteParameter {
                index: index.index(),
            });
        }
        let slot = self.pool.expect_slot(handle)?;

        self.pool.parameters_mut(slot)[node.read_position] = value;
        Ok(())
    }

    pub fn set_freeform_parameter(
        &mut self,
        handle: InstanceHandle,
        index: NodeIndex,
        value: Vec2,
    ) -> BlendTreeResult<()> {
        let node = self.expect_node(index, NodeType::BlendFreeform2D)?;
        if !value.is_finite() {
            return Err(BlendTreeError::NonFiniteParameter {
                index: index.index(),
            });
        }
        let slot = self.pool.expect_slot(handle)?;

        self.pool.parameters_mut(slot)[node.parameters()].copy_from_slice(&value.to_array());
        Ok(())
    }

    /// Recomputes weights, blended lengths and normalized time of every live instance.
    pub fn update(&mut self, time: f32, delta_time: f32, settings: &SimulateSettings) {
        let frame = FrameTime {
            time,
            delta_time,
            time_wrap: settings.time_wrap,
        };
        update_instances(
            &self.graph,
            self.pool.instance_views(),
            frame,
            settings.execution,
        );
    }

    /// Pushes the last update's results into the backend.
    pub fn propagate(&mut self, mode: PropagationMode) {
        propagate(&self.graph, &self.pool, &mut self.backend, mode);
    }

    /// Runs one full frame: update, propagation and backend evaluation.
    pub fn simulate(&mut self, time: f32, delta_time: f32, settings: &SimulateSettings) {
        self.observer.begin(FramePhase::Update);
        self.update(time, delta_time, settings);
        self.observer.end(FramePhase::Update);

        self.observer.begin(FramePhase::Propagate);
        self.propagate(settings.propagation);
        self.observer.end(FramePhase::Propagate);

        self.observer.begin(FramePhase::Evaluate);
        self.backend.evaluate();
        self.observer.end(FramePhase::Evaluate);
    }

    /// Same as [`simulate`](Self::simulate) with the update spread over bevy's compute pool.
    pub fn simulate_parallel(&mut self, time: f32, delta_time: f32, batch_size: usize) {
        let settings = SimulateSettings {
            execution: Execution::Parallel { batch_size },
            ..Default::default()
        };
        self.simulate(time, delta_time, &settings);
    }

    /// Weights of every non-root node; node `i`'s weight is at `i - 1`.
    pub fn weights(&self, handle: InstanceHandle) -> Option<&[f32]> {
        Some(self.pool.weights(self.pool.slot(handle)?))
    }

    /// Weights of `index`'s children, in child order.
    pub fn child_weights(&self, handle: InstanceHandle, index: NodeIndex) -> Option<&[f32]> {
        let node = self.graph.node(index)?;
        Some(&self.weights(handle)?[node.child_weights()])
    }

    pub fn blended_lengths(&self, handle: InstanceHandle) -> Option<&[f32]> {
        Some(self.pool.blended_lengths(self.pool.slot(handle)?))
    }

    pub fn normalized_time(&self, handle: InstanceHandle) -> Option<f32> {
        Some(self.pool.normalized_time(self.pool.slot(handle)?))
    }

    pub fn parameter_buffer(&self, handle: InstanceHandle) -> Option<&[f32]> {
        Some(self.pool.parameters(self.pool.slot(handle)?))
    }

    /// Backend playable created for `index` of the given instance.
    pub fn playable(&self, handle: InstanceHandle, index: NodeIndex) -> Option<B::Playable> {
        let slot = self.pool.slot(handle)?;
        *self.pool.slot_state(slot).playables.get(index.index())?
    }
}

impl<B: PlaybackBackend> Drop for BatchedBlendTree<B> {
    fn drop(&mut self) {
        let released = self.pool.drain();
        if !released.is_empty() {
            debug!("Releasing {} blend tree instances on drop", released.len());
        }
        for instance in released {
            if let Some(output) = instance.output {
                self.backend.destroy_output(output, &instance.playables);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{cell::Cell, rc::Rc};

    use crate::{
        node_graph::ClipRef,
        observer::TimingObserver,
        playback::{PlayableKind, RecordingBackend},
    };

    const EPSILON: f32 = 1e-5;

    type Engine = BatchedBlendTree<RecordingBackend<&'static str>>;

    fn two_states() -> TreeNode {
        TreeNode::state_blend(
            "root",
            [
                TreeNode::clip("a", "clips/a", 2.),
                TreeNode::clip("b", "clips/b", 4.),
            ],
        )
    }

    fn locomotion() -> TreeNode {
        TreeNode::state_blend(
            "root",
            [
                TreeNode::clip("idle", "clips/idle", 2.),
                TreeNode::blend_1d(
                    "speed",
                    [
                        (0., TreeNode::clip("walk", "clips/walk", 1.)),
                        (1., TreeNode::clip("run", "clips/run", 0.5)),
                    ],
                ),
                TreeNode::blend_2d(
                    "strafe",
                    [
                        (Vec2::new(-1., 0.), TreeNode::clip("left", "clips/left", 1.)),
                        (Vec2::new(1., 0.), TreeNode::clip("right", "clips/right", 1.)),
                    ],
                ),
            ],
        )
    }

    fn engine(capacity: usize, root: &TreeNode) -> Engine {
        BatchedBlendTree::new(capacity, root, RecordingBackend::default()).unwrap()
    }

    #[test]
    fn test_state_transition_scenario() {
        let mut engine = engine(1, &two_states());
        let handle = engine.create_instance("a").unwrap();
        let root = NodeIndex::ROOT;

        engine
            .set_state_transition(handle, root, 1, 1., 0.)
            .unwrap();

        let settings = SimulateSettings::default();
        engine.simulate(0., 0., &settings);
        assert_eq!(engine.weights(handle).unwrap(), &[1., 0.]);

        engine.simulate(0.5, 0., &settings);
        assert_eq!(engine.weights(handle).unwrap(), &[0.5, 0.5]);
        assert!((engine.blended_lengths(handle).unwrap()[0] - 3.).abs() < EPSILON);

        engine.simulate(1., 0., &settings);
        assert_eq!(engine.weights(handle).unwrap(), &[0., 1.]);
    }

    #[test]
    fn test_repeated_transition_is_noop() {
        let mut engine = engine(1, &two_states());
        let handle = engine.create_instance("a").unwrap();

        engine
            .set_state_transition(handle, NodeIndex::ROOT, 1, 1., 0.)
            .unwrap();
        let before = engine.parameter_buffer(handle).unwrap().to_vec();

        engine
            .set_state_transition(handle, NodeIndex::ROOT, 1, 5., 3.)
            .unwrap();

        assert_eq!(engine.parameter_buffer(handle).unwrap(), before.as_slice());
        assert_eq!(before, vec![0., 1., 0., 1.]);
    }

    #[test]
    fn test_transition_shifts_previous_state() {
        let mut engine = engine(1, &two_states());
        let handle = engine.create_instance("a").unwrap();

        engine
            .set_state_transition(handle, NodeIndex::ROOT, 1, 1., 0.)
            .unwrap();
        engine
            .set_state_transition(handle, NodeIndex::ROOT, 0, 0.5, 2.)
            .unwrap();

        assert_eq!(engine.parameter_buffer(handle).unwrap(), &[1., 0., 2., 0.5]);
    }

    #[test]
    fn test_setter_preconditions() {
        let mut engine = engine(2, &locomotion());
        let handle = engine.create_instance("a").unwrap();
        let speed = engine.resolve_node_index("speed").unwrap();
        let strafe = engine.resolve_node_index("strafe").unwrap();

        assert_eq!(
            engine.set_linear_parameter(handle, NodeIndex::ROOT, 0.5),
            Err(BlendTreeError::NodeTypeMismatch {
                index: 0,
                expected: NodeType::BlendLinear,
                found: NodeType::BlendStates,
            })
        );
        assert!(matches!(
            engine.set_freeform_parameter(handle, speed, Vec2::ZERO),
            Err(BlendTreeError::NodeTypeMismatch { .. })
        ));
        assert!(matches!(
            engine.set_state_transition(handle, NodeIndex::ROOT, 3, 1., 0.),
            Err(BlendTreeError::StateOutOfRange { state: 3, count: 3, .. })
        ));
        assert!(matches!(
            engine.set_linear_parameter(handle, NodeIndex::new(42), 0.5),
            Err(BlendTreeError::NodeOutOfRange { index: 42, len: 8 })
        ));
        assert_eq!(
            engine.set_freeform_parameter(InstanceHandle::INVALID, strafe, Vec2::ZERO),
            Err(BlendTreeError::InvalidHandle(InstanceHandle::INVALID))
        );

        engine.set_linear_parameter(handle, speed, 0.25).unwrap();
        engine
            .set_freeform_parameter(handle, strafe, Vec2::new(0.5, 0.))
            .unwrap();
        assert_eq!(
            engine.parameter_buffer(handle).unwrap(),
            &[0., 0., 0., 0., 0.25, 0.5, 0.]
        );
    }

    #[test]
    fn test_resolve_missing_node() {
        let engine = engine(1, &locomotion());

        assert_eq!(engine.resolve_node_index("run"), Some(NodeIndex::new(5)));
        assert_eq!(engine.resolve_node_index("swim"), None);
    }

    #[test]
    fn test_pool_exhaustion_and_reuse() {
        let mut engine = engine(3, &two_states());
        let handles: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|target| engine.create_instance(target).unwrap())
            .collect();

        assert_eq!(
            engine.create_instance("d"),
            Err(BlendTreeError::PoolExhausted(3))
        );

        engine.destroy_instance(handles[1]).unwrap();
        let reused = engine.create_instance("e").unwrap();

        assert_eq!(reused.id(), handles[1].id());
        assert_eq!(engine.active_count(), 3);
    }

    #[test]
    fn test_double_destroy_is_rejected() {
        let mut engine = engine(2, &two_states());
        let handle = engine.create_instance("a").unwrap();

        engine.destroy_instance(handle).unwrap();

        assert_eq!(
            engine.destroy_instance(handle),
            Err(BlendTreeError::InvalidHandle(handle))
        );
        assert!(!engine.is_alive(handle));
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let result = BatchedBlendTree::new(0, &two_states(), RecordingBackend::<()>::default());
        assert!(matches!(result, Err(BlendTreeError::ZeroCapacity)));
    }

    #[test]
    fn test_invalid_tree_is_rejected() {
        let result = BatchedBlendTree::new(
            1,
            &TreeNode::blend_1d("empty", []),
            RecordingBackend::<()>::default(),
        );
        assert!(matches!(result, Err(BlendTreeError::InvalidTree(_))));
    }

    #[test]
    fn test_instance_playables_mirror_graph() {
        let mut engine = engine(1, &two_states());
        let handle = engine.create_instance("hero").unwrap();

        let root = engine.playable(handle, NodeIndex::ROOT).unwrap();
        let a = engine.playable(handle, NodeIndex::new(1)).unwrap();
        let b = engine.playable(handle, NodeIndex::new(2)).unwrap();
        let backend = engine.backend();

        assert_eq!(
            backend.playable(root).unwrap().kind,
            PlayableKind::Mixer(vec![a, b])
        );
        assert!(matches!(
            &backend.playable(a).unwrap().kind,
            PlayableKind::Clip(clip) if clip.source == "clips/a"
        ));
        assert_eq!(backend.live_outputs(), 1);
        assert_eq!(backend.live_playables(), 3);
    }

    #[test]
    fn test_destroy_releases_backend_resources() {
        let mut engine = engine(2, &two_states());
        let a = engine.create_instance("a").unwrap();
        let _b = engine.create_instance("b").unwrap();

        engine.destroy_instance(a).unwrap();

        assert_eq!(engine.backend().live_outputs(), 1);
        assert_eq!(engine.backend().live_playables(), 3);
    }

    #[test]
    fn test_compaction_keeps_instance_state() {
        let mut engine = engine(3, &locomotion());
        let speed = engine.resolve_node_index("speed").unwrap();
        let handles: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|target| engine.create_instance(target).unwrap())
            .collect();
        for (i, handle) in handles.iter().enumerate() {
            engine
                .set_state_transition(*handle, NodeIndex::ROOT, 1, 0., 0.)
                .unwrap();
            engine
                .set_linear_parameter(*handle, speed, i as f32 * 0.5)
                .unwrap();
        }
        let settings = SimulateSettings::default();
        engine.simulate(1., 0.1, &settings);
        let expected_c = (
            engine.weights(handles[2]).unwrap().to_vec(),
            engine.blended_lengths(handles[2]).unwrap().to_vec(),
            engine.normalized_time(handles[2]).unwrap(),
        );
        let expected_c_playable = engine.playable(handles[2], NodeIndex::ROOT);

        engine.destroy_instance(handles[0]).unwrap();

        assert_eq!(engine.slot(handles[2]), Some(0));
        assert_eq!(engine.weights(handles[2]).unwrap(), expected_c.0.as_slice());
        assert_eq!(
            engine.blended_lengths(handles[2]).unwrap(),
            expected_c.1.as_slice()
        );
        assert_eq!(engine.normalized_time(handles[2]), Some(expected_c.2));
        assert_eq!(engine.playable(handles[2], NodeIndex::ROOT), expected_c_playable);
        assert_eq!(engine.parameter_buffer(handles[2]).unwrap()[4], 1.);
    }

    #[test]
    fn test_propagation_writes_time_and_weights() {
        let mut engine = engine(1, &two_states());
        let handle = engine.create_instance("a").unwrap();
        engine
            .set_state_transition(handle, NodeIndex::ROOT, 1, 1., 0.)
            .unwrap();

        // Root blended length at t = 0.5 is 3s, so 0.3s moves normalized time by 0.1.
        engine.simulate(0.5, 0.3, &SimulateSettings::default());

        let backend = engine.backend();
        let root = backend
            .playable(engine.playable(handle, NodeIndex::ROOT).unwrap())
            .unwrap();
        assert_eq!(root.input_weights, vec![0.5, 0.5]);
        assert!((root.time - 0.3).abs() < EPSILON);

        let b = backend
            .playable(engine.playable(handle, NodeIndex::new(2)).unwrap())
            .unwrap();
        assert!((b.time - 0.4).abs() < EPSILON);
        assert_eq!(backend.evaluations(), 1);
    }

    #[test]
    fn test_flat_propagation_skips_zero_weight_nodes() {
        let mut engine = engine(1, &locomotion());
        let handle = engine.create_instance("a").unwrap();

        // State 0 (idle) is fully weighted; everything under "speed" and "strafe" is off.
        engine.simulate(0., 0.1, &SimulateSettings::default());

        let backend = engine.backend();
        let writes = |name: &str| {
            let index = engine.graph().find(name).unwrap();
            backend
                .playable(engine.playable(handle, index).unwrap())
                .unwrap()
                .writes
        };
        assert_eq!(writes("root"), 1);
        assert_eq!(writes("idle"), 1);
        assert_eq!(writes("speed"), 0);
        assert_eq!(writes("strafe"), 0);
        // Own weight is non-zero but the parent's is zero: flat scan still writes it.
        assert_eq!(writes("walk"), 1);
        assert_eq!(writes("left"), 1);
    }

    #[test]
    fn test_recursive_propagation_prunes_subtrees() {
        let mut engine = engine(1, &locomotion());
        let handle = engine.create_instance("a").unwrap();

        engine.simulate(0., 0.1, &SimulateSettings::default().recursive());

        let backend = engine.backend();
        let writes = |name: &str| {
            let index = engine.graph().find(name).unwrap();
            backend
                .playable(engine.playable(handle, index).unwrap())
                .unwrap()
                .writes
        };
        assert_eq!(writes("root"), 1);
        assert_eq!(writes("idle"), 1);
        assert_eq!(writes("speed"), 0);
        assert_eq!(writes("walk"), 0);
        assert_eq!(writes("left"), 0);
    }

    #[test]
    fn test_propagation_modes_agree_on_written_nodes() {
        let run = |mode: PropagationMode| {
            let mut engine = engine(1, &locomotion());
            let handle = engine.create_instance("a").unwrap();
            let speed = engine.resolve_node_index("speed").unwrap();
            engine
                .set_state_transition(handle, NodeIndex::ROOT, 1, 1., 0.)
                .unwrap();
            engine.set_linear_parameter(handle, speed, 0.5).unwrap();
            engine.simulate(0.5, 0.25, &SimulateSettings {
                propagation: mode,
                ..Default::default()
            });

            ["root", "idle", "speed", "walk", "run"]
                .map(|name| {
                    let index = engine.graph().find(name).unwrap();
                    let playable = engine.playable(handle, index).unwrap();
                    let recorded = engine.backend().playable(playable).unwrap();
                    (recorded.time, recorded.input_weights.clone())
                })
                .to_vec()
        };

        assert_eq!(run(PropagationMode::Flat), run(PropagationMode::Recursive));
    }

    #[test]
    fn test_parallel_simulation_matches_serial() {
        let run = |settings: SimulateSettings| {
            let mut engine = engine(16, &locomotion());
            let speed = engine.resolve_node_index("speed").unwrap();
            let strafe = engine.resolve_node_index("strafe").unwrap();
            let handles: Vec<_> = (0..16)
                .map(|_| engine.create_instance("npc").unwrap())
                .collect();
            for (i, handle) in handles.iter().enumerate() {
                let f = i as f32 / 16.;
                engine
                    .set_state_transition(*handle, NodeIndex::ROOT, 1 + i % 2, 0.5, 0.)
                    .unwrap();
                engine.set_linear_parameter(*handle, speed, f).unwrap();
                engine
                    .set_freeform_parameter(*handle, strafe, Vec2::new(f * 2. - 1., 0.))
                    .unwrap();
            }
            for frame in 0..10 {
                engine.simulate(frame as f32 * 0.1, 0.1, &settings);
            }
            handles
                .iter()
                .map(|h| {
                    (
                        engine.weights(*h).unwrap().to_vec(),
                        engine.normalized_time(*h).unwrap(),
                    )
                })
                .collect::<Vec<_>>()
        };

        assert_eq!(
            run(SimulateSettings::default()),
            run(SimulateSettings::default().parallel(3))
        );
    }

    #[test]
    fn test_normalized_time_wraps_by_default() {
        let mut engine = engine(1, &two_states());
        let handle = engine.create_instance("a").unwrap();

        // Root length 2s: 3s of playback wraps to 0.5.
        engine.simulate(0., 3., &SimulateSettings::default());

        assert!((engine.normalized_time(handle).unwrap() - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_new_instance_starts_fresh_after_reuse() {
        let mut engine = engine(1, &two_states());
        let handle = engine.create_instance("a").unwrap();
        engine
            .set_state_transition(handle, NodeIndex::ROOT, 1, 1., 0.)
            .unwrap();
        engine.simulate(0.5, 0.5, &SimulateSettings::default());

        engine.destroy_instance(handle).unwrap();
        let handle = engine.create_instance("b").unwrap();

        assert_eq!(engine.parameter_buffer(handle).unwrap(), &[0.; 4]);
        assert_eq!(engine.normalized_time(handle), Some(0.));
    }

    #[test]
    fn test_observer_sees_every_phase() {
        let mut engine = engine(1, &two_states()).with_observer(TimingObserver::default());
        engine.create_instance("a").unwrap();

        engine.simulate_parallel(0., 0.1, 8);

        assert_eq!(engine.backend().evaluations(), 1);
    }

    #[test]
    fn test_empty_graph_is_rejected() {
        let result = BatchedBlendTree::from_graph(
            1,
            NodeGraph::empty(),
            RecordingBackend::<()>::default(),
        );
        assert!(matches!(result, Err(BlendTreeError::EmptyGraph)));
    }

    #[test]
    fn test_exhausted_pool_creates_no_backend_resources() {
        let mut engine = engine(1, &two_states());
        engine.create_instance("a").unwrap();

        assert_eq!(
            engine.create_instance("b"),
            Err(BlendTreeError::PoolExhausted(1))
        );
        assert_eq!(engine.active_count(), 1);
        assert_eq!(engine.backend().live_outputs(), 1);
        assert_eq!(engine.backend().live_playables(), 3);
    }

    #[test]
    fn test_non_finite_parameters_are_rejected() {
        let mut engine = engine(1, &locomotion());
        let handle = engine.create_instance("a").unwrap();
        let speed = engine.resolve_node_index("speed").unwrap();
        let strafe = engine.resolve_node_index("strafe").unwrap();

        assert_eq!(
            engine.set_linear_parameter(handle, speed, f32::NAN),
            Err(BlendTreeError::NonFiniteParameter { index: 2 })
        );
        assert_eq!(
            engine.set_freeform_parameter(handle, strafe, Vec2::new(0., f32::INFINITY)),
            Err(BlendTreeError::NonFiniteParameter { index: 3 })
        );
        assert_eq!(
            engine.set_state_transition(handle, NodeIndex::ROOT, 1, f32::NAN, 0.),
            Err(BlendTreeError::NonFiniteParameter { index: 0 })
        );
        assert_eq!(
            engine.set_state_transition(handle, NodeIndex::ROOT, 1, 1., f32::NEG_INFINITY),
            Err(BlendTreeError::NonFiniteParameter { index: 0 })
        );
        assert_eq!(engine.parameter_buffer(handle).unwrap(), &[0.; 7]);

        // Rejected writes leave the weights normalized.
        engine.simulate(0., 0.1, &SimulateSettings::default());
        let root_weights: f32 = engine
            .child_weights(handle, NodeIndex::ROOT)
            .unwrap()
            .iter()
            .sum();
        let speed_weights: f32 = engine.child_weights(handle, speed).unwrap().iter().sum();
        assert_eq!(root_weights, 1.);
        assert_eq!(speed_weights, 1.);
    }

    /// Counts live outputs and playables in storage that outlives the engine.
    #[derive(Default)]
    struct CountingBackend {
        live: Rc<Cell<(usize, usize)>>,
        next: usize,
    }

    impl PlaybackBackend for CountingBackend {
        type Target = ();
        type Playable = usize;
        type Output = usize;

        fn create_clip(&mut self, _clip: &ClipRef) -> usize {
            self.create_mixer(&[])
        }

        fn create_mixer(&mut self, _inputs: &[usize]) -> usize {
            let (outputs, playables) = self.live.get();
            self.live.set((outputs, playables + 1));
            self.next += 1;
            self.next
        }

        fn create_output(&mut self, _target: (), root: usize) -> usize {
            let (outputs, playables) = self.live.get();
            self.live.set((outputs + 1, playables));
            root
        }

        fn destroy_output(&mut self, _output: usize, released: &[usize]) {
            let (outputs, playables) = self.live.get();
            self.live.set((outputs - 1, playables - released.len()));
        }

        fn set_time(&mut self, _playable: usize, _time: f32) {}
        fn set_input_weight(&mut self, _playable: usize, _input: usize, _weight: f32) {}
        fn evaluate(&mut self) {}
    }

    #[test]
    fn test_drop_releases_outputs() {
        let backend = CountingBackend::default();
        let live = backend.live.clone();
        let mut engine = BatchedBlendTree::new(4, &locomotion(), backend).unwrap();
        let a = engine.create_instance(()).unwrap();
        engine.create_instance(()).unwrap();
        engine.create_instance(()).unwrap();
        engine.destroy_instance(a).unwrap();

        assert_eq!(live.get(), (2, 16));

        drop(engine);

        assert_eq!(live.get(), (0, 0));
    }
}
