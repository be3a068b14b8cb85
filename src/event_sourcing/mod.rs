// ============================================================================
// Aggregate Infrastructure
// ============================================================================
//
// Generic command/event plumbing shared by the aggregates in src/domain/.
// Persistence of documents and their event history lives in src/store/.
//
// ============================================================================

mod core;

pub use self::core::*;
