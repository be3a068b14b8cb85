// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each area has its own subdirectory with value objects, errors and the
// logic that enforces its invariants:
// - inventory: products and the stock ledger contract
// - cart:      the user's pending selection
// - order:     the order aggregate and its role-gated state machine
//
// Storage backends live in src/store/, orchestration in src/services/.
//
// ============================================================================

pub mod identity;
pub mod money;
pub mod inventory;
pub mod cart;
pub mod order;
