// ============================================================================
// Cart Domain
// ============================================================================

pub mod value_objects;
pub mod errors;

pub use value_objects::*;
pub use errors::*;
