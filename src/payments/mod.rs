// ============================================================================
// Payment Collaborator
// ============================================================================
//
// - gateway: outbound intent / checkout-session creation behind a circuit
//   breaker
// - events:  parsing of inbound provider callbacks into payment events
// - webhook: signature verification of inbound callbacks
//
// ============================================================================

pub mod gateway;
pub mod events;
pub mod webhook;

pub use gateway::*;
pub use events::*;
pub use webhook::*;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),

    #[error("Payment provider rejected the request: {0}")]
    Rejected(String),

    #[error("Missing webhook signature")]
    MissingSignature,

    #[error("Malformed webhook signature header")]
    MalformedSignature,

    #[error("Webhook signature does not match payload")]
    SignatureMismatch,

    #[error("Webhook timestamp outside tolerance ({age_secs}s old)")]
    StaleSignature { age_secs: i64 },

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),
}
