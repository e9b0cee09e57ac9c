mod blend_tree_error;
mod tree_loader_error;
mod validation_error;

pub use blend_tree_error::*;
pub use tree_loader_error::*;
pub use validation_error::*;
