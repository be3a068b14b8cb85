// ============================================================================
// Auth Collaborator
// ============================================================================
//
// Tokens are issued elsewhere; this side only verifies HS256 bearer tokens
// and remembers tokens invalidated by logout until they would have expired
// anyway.
//
// ============================================================================

pub mod blocklist;
pub mod token;

pub use blocklist::TokenBlocklist;
pub use token::{AuthenticatedToken, Claims, JwtAuthenticator};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingToken,

    #[error("Malformed token")]
    Malformed,

    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Token has been revoked")]
    Revoked,
}
