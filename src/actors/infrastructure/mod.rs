// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// - Health monitoring of the payment provider and the order store
// - Reservation reaper: lapses expired stock holds, purges the token blocklist
//
// ============================================================================

mod health_monitor;
mod probes;
mod reservation_reaper;

pub use health_monitor::{GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth};
pub use probes::{PaymentGatewayProbe, StoreProbe};
pub use reservation_reaper::{ReservationReaper, Sweep, SweepReport};
