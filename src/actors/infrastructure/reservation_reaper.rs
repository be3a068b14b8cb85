use kameo::Actor;
use kameo::message::{Context, Message};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::reply::{Reply, ReplyError};
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use crate::auth::TokenBlocklist;
use crate::services::PaymentReconciler;

// ============================================================================
// Reservation Reaper Actor - Periodic housekeeping
// ============================================================================
//
// Each sweep:
// - lapses stock holds of unpaid orders whose hold expired, returning the
//   units to the ledger
// - drops revoked tokens that have expired anyway from the blocklist
//
// Failures are logged and retried on the next tick.
//
// ============================================================================

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
pub struct Sweep {
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub holds_lapsed: usize,
    pub tokens_purged: usize,
}

impl Reply for SweepReport {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> {
        Ok(self)
    }

    fn into_any_err(self) -> Option<Box<dyn ReplyError>> {
        None
    }

    fn into_value(self) -> Self::Value {
        self
    }
}

// ============================================================================
// Reservation Reaper Actor
// ============================================================================

pub struct ReservationReaper {
    reconciler: Arc<PaymentReconciler>,
    blocklist: Arc<TokenBlocklist>,
    interval: Duration,
}

impl ReservationReaper {
    pub fn new(reconciler: Arc<PaymentReconciler>, blocklist: Arc<TokenBlocklist>, interval: Duration) -> Self {
        Self {
            reconciler,
            blocklist,
            interval,
        }
    }
}

impl Actor for ReservationReaper {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(
        state: Self::Args,
        actor_ref: ActorRef<Self>
    ) -> Result<Self, Self::Error> {
        tracing::info!(interval_secs = state.interval.as_secs(), "ReservationReaper started");

        let period = state.interval;
        let actor_ref_clone = actor_ref.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick fires immediately; let the server come up first
            interval.tick().await;
            loop {
                interval.tick().await;

                if actor_ref_clone.tell(Sweep { now: Utc::now() }).send().await.is_err() {
                    tracing::debug!("ReservationReaper stopped, ending sweeps");
                    return;
                }
            }
        });

        Ok(state)
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<Sweep> for ReservationReaper {
    type Reply = SweepReport;

    async fn handle(&mut self, msg: Sweep, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let holds_lapsed = match self.reconciler.lapse_expired_holds(msg.now).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(error = %e, "Failed to lapse expired stock holds");
                0
            }
        };

        let tokens_purged = self.blocklist.purge_expired(msg.now).await;

        if holds_lapsed > 0 || tokens_purged > 0 {
            tracing::info!(holds_lapsed, tokens_purged, "Sweep completed");
        }

        SweepReport {
            holds_lapsed,
            tokens_purged,
        }
    }
}
