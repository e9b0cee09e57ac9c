use thiserror::Error;

use super::TreeValidationError;

/// Possible errors produced while loading an authored tree
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TreeLoaderError {
    #[error("could not read blend tree: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse RON: {0}")]
    RonSpannedError(#[from] ron::error::SpannedError),
    #[error("could not serialize RON: {0}")]
    RonError(#[from] ron::Error),
    #[error("blend tree does not satisfy constraints: {0}")]
    Validation(#[from] TreeValidationError),
}
