// ============================================================================
// Order Domain - Business Logic for the Order Aggregate
// ============================================================================
//
// - Value objects (OrderItem, OrderStatus, PaymentMethod, StockHold, ...)
// - Transition tables keyed by (role, status)
// - Events, commands and business rule errors
// - Aggregate (Order) and its read views
// - Command handler (load, execute, persist with a version check)
//
// ============================================================================

pub mod value_objects;
pub mod transitions;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod views;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use views::*;
pub use command_handler::*;
