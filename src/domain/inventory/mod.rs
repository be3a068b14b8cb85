// ============================================================================
// Inventory Domain
// ============================================================================
//
// - Value objects (Product, StockLine)
// - Errors (InventoryError)
// - Ledger contract and the all-or-nothing reservation helpers
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod ledger;

pub use value_objects::*;
pub use errors::*;
pub use ledger::*;
