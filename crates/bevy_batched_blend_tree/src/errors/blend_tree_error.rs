use thiserror::Error;

use super::TreeValidationError;
use crate::{handle::InstanceHandle, node_graph::NodeType};

/// Precondition violations reported by the batched engine.
///
/// These are programmer errors: the engine never applies a partial change
/// before returning one of them.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BlendTreeError {
    #[error("tree rejected: {0}")]
    InvalidTree(#[from] TreeValidationError),
    #[error("instance capacity must be at least 1")]
    ZeroCapacity,
    #[error("node graph has no root node")]
    EmptyGraph,
    #[error("all {0} instance slots are in use")]
    PoolExhausted(usize),
    #[error("{0:?} does not refer to a live instance")]
    InvalidHandle(InstanceHandle),
    #[error("node index {index} is out of range for a graph of {len} nodes")]
    NodeOutOfRange { index: usize, len: usize },
    #[error("node {index} is a {found:?} node, expected {expected:?}")]
    NodeTypeMismatch {
        index: usize,
        expected: NodeType,
        found: NodeType,
    },
    #[error("state {state} is out of range for node {index} with {count} states")]
    StateOutOfRange {
        index: usize,
        state: usize,
        count: usize,
    },
    #[error("non-finite value written to node {index}")]
    NonFiniteParameter { index: usize },
}

pub type BlendTreeResult<T> = Result<T, BlendTreeError>;
