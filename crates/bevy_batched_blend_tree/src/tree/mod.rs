//! Author-time blend tree.
//!
//! This is the shape tooling produces and `*.blendtree.ron` files contain. It is only ever
//! walked once, by [`NodeGraph::from_tree`], which flattens it into the runtime layout.
//!
//! [`NodeGraph::from_tree`]: crate::node_graph::NodeGraph::from_tree

pub mod loader;

use bevy::math::Vec2;
use serde::{Deserialize, Serialize};

/// Leaf node playing back a single animation clip.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClipNode {
    pub name: String,
    /// Identifier the playback backend uses to find the clip data.
    pub clip: String,
    /// Clip duration in seconds.
    pub length: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Blend1DChild {
    pub node: TreeNode,
    pub position: f32,
}

/// Blends its children along a single axis. Child positions must be strictly ascending.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Blend1DNode {
    pub name: String,
    pub children: Vec<Blend1DChild>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Blend2DChild {
    pub node: TreeNode,
    pub position: Vec2,
}

/// Freeform cartesian blend over children placed on a plane.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Blend2DNode {
    pub name: String,
    pub children: Vec<Blend2DChild>,
}

/// Cross-fades between two of its states at a time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StateBlendNode {
    pub name: String,
    pub states: Vec<TreeNode>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum TreeNode {
    Clip(ClipNode),
    Blend1D(Blend1DNode),
    Blend2D(Blend2DNode),
    StateBlend(StateBlendNode),
}

impl TreeNode {
    pub fn clip(name: impl Into<String>, clip: impl Into<String>, length: f32) -> Self {
        Self::Clip(ClipNode {
            name: name.into(),
            clip: clip.into(),
            length,
        })
    }

    pub fn blend_1d(
        name: impl Into<String>,
        children: impl IntoIterator<Item = (f32, TreeNode)>,
    ) -> Self {
        Self::Blend1D(Blend1DNode {
            name: name.into(),
            children: children
                .into_iter()
                .map(|(position, node)| Blend1DChild { node, position })
                .collect(),
        })
    }

    pub fn blend_2d(
        name: impl Into<String>,
        children: impl IntoIterator<Item = (Vec2, TreeNode)>,
    ) -> Self {
        Self::Blend2D(Blend2DNode {
            name: name.into(),
            children: children
                .into_iter()
                .map(|(position, node)| Blend2DChild { node, position })
                .collect(),
        })
    }

    pub fn state_blend(name: impl Into<String>, states: impl IntoIterator<Item = TreeNode>) -> Self {
        Self::StateBlend(StateBlendNode {
            name: name.into(),
            states: states.into_iter().collect(),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            TreeNode::Clip(node) => &node.name,
            TreeNode::Blend1D(node) => &node.name,
            TreeNode::Blend2D(node) => &node.name,
            TreeNode::StateBlend(node) => &node.name,
        }
    }

    /// Direct children, in authored order.
    pub fn children(&self) -> Vec<&TreeNode> {
        match self {
            TreeNode::Clip(_) => vec![],
            TreeNode::Blend1D(node) => node.children.iter().map(|c| &c.node).collect(),
            TreeNode::Blend2D(node) => node.children.iter().map(|c| &c.node).collect(),
            TreeNode::StateBlend(node) => node.states.iter().collect(),
        }
    }
}
