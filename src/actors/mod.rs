// ============================================================================
// Actors Module
// ============================================================================
//
// Background infrastructure running next to the HTTP server.
//
// Structure:
// - core/           - Health abstractions (HealthStatus, HealthCheck)
// - infrastructure/ - Concrete actors (HealthMonitor, ReservationReaper)
//                     and the probes the health monitor polls
//
// Note: Order logic runs in the command handler, NOT in actors.
//       Actors are reserved for periodic infrastructure work.
//
// ============================================================================

mod core;
mod infrastructure;

pub use self::core::{ComponentHealth, HealthCheck, HealthStatus};
pub use infrastructure::{
    GetSystemHealth,
    HealthMonitorActor,
    PaymentGatewayProbe,
    ReservationReaper,
    StoreProbe,
    Sweep,
    SweepReport,
    SystemHealth,
    UpdateHealth,
};
