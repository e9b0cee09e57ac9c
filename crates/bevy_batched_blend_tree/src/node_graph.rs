use std::{collections::VecDeque, fmt, ops::Range};

use bevy::{log::warn, math::Vec2, platform::collections::HashSet, reflect::Reflect};
use serde::{Deserialize, Serialize};

use crate::{
    errors::TreeValidationError,
    tree::{Blend1DNode, Blend2DNode, ClipNode, StateBlendNode, TreeNode},
};

#[derive(Reflect, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Clip,
    /// Binary cross-fade between a previous and a current state.
    BlendStates,
    /// One-dimensional blend, one position per child.
    BlendLinear,
    /// Freeform cartesian blend, two positions per child.
    BlendFreeform2D,
}

impl NodeType {
    /// Number of floats the node reads from each instance's parameter buffer.
    pub const fn buffer_footprint(self) -> usize {
        match self {
            NodeType::Clip => 0,
            NodeType::BlendStates => 4,
            NodeType::BlendLinear => 1,
            NodeType::BlendFreeform2D => 2,
        }
    }
}

/// Position of a node in the flattened graph. The root is always index 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(usize);

impl NodeIndex {
    pub const ROOT: NodeIndex = NodeIndex(0);

    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<NodeIndex> for usize {
    fn from(value: NodeIndex) -> Self {
        value.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Flattened node record.
///
/// Children of a node occupy `first_child..first_child + child_count` in the node array, and
/// the weight of node `i` lives at `i - 1` in an instance's weight slice (the root has none).
#[derive(Reflect, Clone, Copy, Debug, PartialEq)]
pub struct Node {
    pub ty: NodeType,
    pub length: f32,
    pub child_count: usize,
    pub first_child: usize,
    pub first_position: usize,
    pub read_position: usize,
}

impl Node {
    fn clip(length: f32, read_position: usize) -> Self {
        Self {
            ty: NodeType::Clip,
            length,
            child_count: 0,
            first_child: 0,
            first_position: 0,
            read_position,
        }
    }

    pub fn is_clip(&self) -> bool {
        self.ty == NodeType::Clip
    }

    pub fn children(&self) -> Range<usize> {
        self.first_child..self.first_child + self.child_count
    }

    /// Range of this node's children inside an instance's weight slice.
    pub fn child_weights(&self) -> Range<usize> {
        if self.child_count == 0 {
            0..0
        } else {
            self.first_child - 1..self.first_child - 1 + self.child_count
        }
    }

    /// Range of this node's live values inside an instance's parameter buffer.
    pub fn parameters(&self) -> Range<usize> {
        self.read_position..self.read_position + self.ty.buffer_footprint()
    }
}

/// Entry of the clip-reference table handed to the playback backend.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipRef {
    pub source: String,
    pub length: f32,
}

/// Immutable breadth-first flattening of an authored [`TreeNode`].
#[derive(Clone, Debug, PartialEq)]
pub struct NodeGraph {
    nodes: Vec<Node>,
    names: Vec<String>,
    clip_indices: Vec<Option<usize>>,
    clips: Vec<ClipRef>,
    positions: Vec<f32>,
    buffer_size: usize,
}

impl NodeGraph {
    /// Flattens `root` breadth-first.
    ///
    /// The whole tree is rejected if any node fails validation; no partial graph is produced.
    pub fn from_tree(root: &TreeNode) -> Result<Self, TreeValidationError> {
        let mut graph = NodeGraph::empty();
        let mut queue = VecDeque::from([root]);

        while let Some(tree_node) = queue.pop_front() {
            // Everything still queued sits between this node and its children.
            let first_child = graph.nodes.len() + 1 + queue.len();
            let read_position = graph.buffer_size;

            let node = match tree_node {
                TreeNode::Clip(clip) => graph.push_clip(clip, read_position)?,
                TreeNode::Blend1D(blend) => {
                    let node = graph.push_blend_1d(blend, first_child, read_position)?;
                    queue.extend(blend.children.iter().map(|child| &child.node));
                    node
                }
                TreeNode::Blend2D(blend) => {
                    let node = graph.push_blend_2d(blend, first_child, read_position)?;
                    queue.extend(blend.children.iter().map(|child| &child.node));
                    node
                }
                TreeNode::StateBlend(blend) => {
                    let node = graph.push_state_blend(blend, first_child, read_position)?;
                    queue.extend(blend.states.iter());
                    node
                }
            };

            graph.buffer_size += node.ty.buffer_footprint();
            graph.names.push(tree_node.name().to_owned());
            graph.nodes.push(node);
        }

        graph.warn_duplicate_names();
        Ok(graph)
    }

    pub(crate) fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            names: Vec::new(),
            clip_indices: Vec::new(),
            clips: Vec::new(),
            positions: Vec::new(),
            buffer_size: 0,
        }
    }

    fn push_clip(
        &mut self,
        clip: &ClipNode,
        read_position: usize,
    ) -> Result<Node, TreeValidationError> {
        if !clip.length.is_finite() || clip.length < 0. {
            return Err(TreeValidationError::InvalidClipLength {
                name: clip.name.clone(),
                length: clip.length,
            });
        }

        self.clip_indices.push(Some(self.clips.len()));
        self.clips.push(ClipRef {
            source: clip.clip.clone(),
            length: clip.length,
        });

        Ok(Node::clip(clip.length, read_position))
    }

    fn push_blend_1d(
        &mut self,
        blend: &Blend1DNode,
        first_child: usize,
        read_position: usize,
    ) -> Result<Node, TreeValidationError> {
        if blend.children.is_empty() {
            return Err(TreeValidationError::EmptyBlend(blend.name.clone()));
        }
        if blend.children.iter().any(|c| !c.position.is_finite()) {
            return Err(TreeValidationError::NonFinitePosition(blend.name.clone()));
        }
        if blend
            .children
            .windows(2)
            .any(|pair| pair[0].position >= pair[1].position)
        {
            return Err(TreeValidationError::UnsortedPositions(blend.name.clone()));
        }

        let first_position = self.positions.len();
        self.positions
            .extend(blend.children.iter().map(|child| child.position));
        self.clip_indices.push(None);

        Ok(Node {
            ty: NodeType::BlendLinear,
            length: 0.,
            child_count: blend.children.len(),
            first_child,
            first_position,
            read_position,
        })
    }

    fn push_blend_2d(
        &mut self,
        blend: &Blend2DNode,
        first_child: usize,
        read_position: usize,
    ) -> Result<Node, TreeValidationError> {
        if blend.children.is_empty() {
            return Err(TreeValidationError::EmptyBlend(blend.name.clone()));
        }
        if blend.children.iter().any(|c| !c.position.is_finite()) {
            return Err(TreeValidationError::NonFinitePosition(blend.name.clone()));
        }
        for (i, a) in blend.children.iter().enumerate() {
            if blend.children[i + 1..]
                .iter()
                .any(|b| a.position == b.position)
            {
                return Err(TreeValidationError::DuplicatePositions(blend.name.clone()));
            }
        }

        let first_position = self.positions.len();
        self.positions.extend(
            blend
                .children
                .iter()
                .flat_map(|child| child.position.to_array()),
        );
        self.clip_indices.push(None);

        Ok(Node {
            ty: NodeType::BlendFreeform2D,
            length: 0.,
            child_count: blend.children.len(),
            first_child,
            first_position,
            read_position,
        })
    }

    fn push_state_blend(
        &mut self,
        blend: &StateBlendNode,
        first_child: usize,
        read_position: usize,
    ) -> Result<Node, TreeValidationError> {
        if blend.states.is_empty() {
            return Err(TreeValidationError::EmptyBlend(blend.name.clone()));
        }

        self.clip_indices.push(None);

        Ok(Node {
            ty: NodeType::BlendStates,
            length: 0.,
            child_count: blend.states.len(),
            first_child,
            first_position: 0,
            read_position,
        })
    }

    fn warn_duplicate_names(&self) {
        let mut seen = HashSet::new();
        for name in &self.names {
            if !seen.insert(name.as_str()) {
                warn!(
                    "Blend tree node name {:?} is used more than once, lookups will resolve to the first one",
                    name
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index.0)
    }

    pub fn name(&self, index: NodeIndex) -> Option<&str> {
        self.names.get(index.0).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Clip reference of a clip node, `None` for operators.
    pub fn clip(&self, index: NodeIndex) -> Option<&ClipRef> {
        let clip_index = (*self.clip_indices.get(index.0)?)?;
        self.clips.get(clip_index)
    }

    pub fn clips(&self) -> &[ClipRef] {
        &self.clips
    }

    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    /// Total number of floats in one instance's parameter buffer.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of weights stored per instance: one per non-root node.
    pub fn weight_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    /// First node with the given name, in flattening order.
    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        self.names.iter().position(|n| n == name).map(NodeIndex)
    }

    pub fn positions_1d(&self, node: &Node) -> &[f32] {
        match node.ty {
            NodeType::BlendLinear => {
                &self.positions[node.first_position..node.first_position + node.child_count]
            }
            _ => &[],
        }
    }

    pub fn positions_2d(&self, node: &Node) -> &[[f32; 2]] {
        match node.ty {
            NodeType::BlendFreeform2D => {
                let flat =
                    &self.positions[node.first_position..node.first_position + 2 * node.child_count];
                flat.as_chunks::<2>().0
            }
            _ => &[],
        }
    }

    /// Convenience accessor for a single 2D child position.
    pub fn position_2d(&self, node: &Node, child: usize) -> Option<Vec2> {
        self.positions_2d(node).get(child).copied().map(Vec2::from_array)
    }
}
