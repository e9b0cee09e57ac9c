//! # Bevy Batched Blend Tree
//!
//! **Bevy Batched Blend Tree** evaluates many instances of the same animation blend tree in
//! lockstep, with all per-instance data packed into contiguous arrays.
//!
//! ## Introduction
//!
//! A blend tree is authored as a [`TreeNode`] hierarchy, either in code through the builder
//! functions or in `*.blendtree.ron` files. Adding [`BatchedBlendTreePlugin`] to an app
//! registers [`BlendTreeLoader`], which loads those files as [`BlendTreeAsset`]s. For example:
//! ```ron
//! StateBlend((
//!     name: "root",
//!     states: [
//!         Clip((name: "idle", clip: "clips/idle", length: 2.0)),
//!         Blend1D((
//!             name: "speed",
//!             children: [
//!                 (node: Clip((name: "walk", clip: "clips/walk", length: 1.0)), position: 0.0),
//!                 (node: Clip((name: "run", clip: "clips/run", length: 0.5)), position: 1.0),
//!             ],
//!         )),
//!     ],
//! ))
//! ```
//!
//! The tree is flattened once, breadth-first, into a [`NodeGraph`]. A [`BatchedBlendTree`]
//! then owns storage for a fixed number of instances: each one has its own parameter buffer,
//! child weights, blended lengths and normalized time. Destroying an instance moves the last
//! live instance into its slot, so live data is always packed at the front of every array
//! while [`InstanceHandle`]s stay valid.
//!
//! Sampling is left to a [`PlaybackBackend`], which receives one playable per node and
//! instance. Every frame the engine writes node times and input weights into those playables
//! and asks the backend to evaluate. [`RecordingBackend`] keeps everything in memory and is
//! handy for tooling and tests.
//!
//! ## Usage
//!
//! ```ignore
//! app.add_plugins(BatchedBlendTreePlugin);
//! let locomotion: Handle<BlendTreeAsset> = asset_server.load("locomotion.blendtree.ron");
//!
//! // Once loaded:
//! let tree = blend_trees.get(&locomotion).unwrap();
//! let mut blend_tree = BatchedBlendTree::from_graph(256, tree.graph.clone(), backend)?;
//! let speed = blend_tree.resolve_node_index("speed").unwrap();
//!
//! let npc = blend_tree.create_instance(entity)?;
//! blend_tree.set_state_transition(npc, NodeIndex::ROOT, 1, 0.3, time)?;
//! blend_tree.set_linear_parameter(npc, speed, 0.8)?;
//!
//! blend_tree.simulate(time, delta_time, &SimulateSettings::default().parallel(32));
//! ```
//!
//! [`TreeNode`]: crate::tree::TreeNode
//! [`BatchedBlendTreePlugin`]: crate::plugin::BatchedBlendTreePlugin
//! [`BlendTreeLoader`]: crate::tree::loader::BlendTreeLoader
//! [`BlendTreeAsset`]: crate::tree::loader::BlendTreeAsset
//! [`NodeGraph`]: crate::node_graph::NodeGraph
//! [`BatchedBlendTree`]: crate::engine::BatchedBlendTree
//! [`InstanceHandle`]: crate::handle::InstanceHandle
//! [`PlaybackBackend`]: crate::playback::PlaybackBackend
//! [`RecordingBackend`]: crate::playback::RecordingBackend

pub mod blend_weights;
pub mod engine;
pub mod errors;
pub mod handle;
pub mod node_graph;
pub mod observer;
pub mod playback;
pub mod plugin;
mod pool;
pub mod settings;
pub mod tree;
pub mod update;

pub mod prelude {
    pub use crate::{
        engine::BatchedBlendTree,
        errors::{BlendTreeError, BlendTreeResult, TreeLoaderError, TreeValidationError},
        handle::InstanceHandle,
        node_graph::{NodeGraph, NodeIndex, NodeType},
        observer::{FrameObserver, FramePhase, NoopObserver, TimingObserver},
        playback::{PlaybackBackend, RecordingBackend},
        plugin::BatchedBlendTreePlugin,
        settings::{Execution, PropagationMode, SimulateSettings, TimeWrap},
        tree::{
            TreeNode,
            loader::{BlendTreeAsset, BlendTreeLoader},
        },
    };
}
