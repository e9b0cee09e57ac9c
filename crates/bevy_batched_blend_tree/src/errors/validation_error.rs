use thiserror::Error;

/// Reasons an authored tree is rejected when it is flattened.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TreeValidationError {
    #[error("blend node {0:?} has no children")]
    EmptyBlend(String),
    #[error("linear blend node {0:?} positions are not strictly ascending")]
    UnsortedPositions(String),
    #[error("2D blend node {0:?} has two children at the same position")]
    DuplicatePositions(String),
    #[error("blend node {0:?} has a non-finite child position")]
    NonFinitePosition(String),
    #[error("clip node {name:?} has an invalid length {length}")]
    InvalidClipLength { name: String, length: f32 },
}
