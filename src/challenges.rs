//! # Challenge Cache
//!
//! Pending ceremonies between the options request and the client's response.
//! They live in memory only: an entry is worthless after a few minutes and a
//! restart simply makes clients ask for new options.
//!
//! Entries are single use. `take` removes the entry atomically, so of two
//! concurrent submissions for the same key exactly one gets to verify. An
//! entry older than the TTL is never handed out, even before the background
//! sweep has removed it.

use crate::fido2::IssuedOptions;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Default lifetime of a pending ceremony (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct PendingChallenge {
    options: IssuedOptions,
    created_at: Instant,
}

/// Keyed, single-use store of issued options.
#[derive(Debug)]
pub struct ChallengeCache {
    /// `registration` or `assertion`, for log lines
    kind: &'static str,
    ttl: Duration,
    entries: DashMap<String, PendingChallenge>,
}

impl ChallengeCache {
    pub fn new(kind: &'static str, ttl: Duration) -> Self {
        Self {
            kind,
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Stores `options` under `key`, replacing whatever was pending there.
    pub fn put(&self, key: String, options: IssuedOptions) {
        let replaced = self
            .entries
            .insert(
                key,
                PendingChallenge {
                    options,
                    created_at: Instant::now(),
                },
            )
            .is_some();

        if replaced {
            tracing::debug!(kind = self.kind, "Replaced pending challenge");
        }
    }

    /// Removes and returns the entry under `key` if it is still within its TTL.
    pub fn take(&self, key: &str) -> Option<IssuedOptions> {
        let (_, pending) = self.entries.remove(key)?;
        if pending.created_at.elapsed() < self.ttl {
            Some(pending.options)
        } else {
            tracing::debug!(kind = self.kind, "Pending challenge expired");
            None
        }
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, pending| pending.created_at.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}
