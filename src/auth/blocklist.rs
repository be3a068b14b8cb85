use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

// ============================================================================
// Token Blocklist - tokens invalidated by logout
// ============================================================================
//
// Entries are indexed by the token's own expiry. Once that passes the token
// is rejected as expired anyway, so `purge_expired` can drop it.
//
// ============================================================================

#[derive(Default)]
struct Entries {
    tokens: HashSet<String>,
    by_expiry: BTreeMap<DateTime<Utc>, Vec<String>>,
}

#[derive(Default)]
pub struct TokenBlocklist {
    entries: RwLock<Entries>,
}

impl TokenBlocklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        if entries.tokens.insert(token.to_string()) {
            entries
                .by_expiry
                .entry(expires_at)
                .or_default()
                .push(token.to_string());
        }
    }

    pub async fn is_revoked(&self, token: &str) -> bool {
        self.entries.read().await.tokens.contains(token)
    }

    /// Drop entries whose token expired at or before `now`; returns how many
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut guard = self.entries.write().await;
        let entries = &mut *guard;

        let mut purged = 0;
        while let Some(entry) = entries.by_expiry.first_entry() {
            if *entry.key() > now {
                break;
            }
            let tokens = entry.remove();
            purged += tokens.len();
            for token in tokens {
                entries.tokens.remove(&token);
            }
        }
        purged
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.tokens.len()
    }
}
