//! The `(signatory, nonce)` replay cache.
//!
//! A nonce is only unique per-signatory, not globally (original_source's
//! broader behavior the distilled spec's "(signatory, nonce)" phrasing
//! already implies, but is easy to get wrong by keying on the nonce alone):
//! two different signatories may reuse the same nonce value without
//! colliding. The cache bounds its own growth by the replay window — an
//! entry older than `skew` from "now" is pruned on the next write, so no
//! unbounded accumulation across a long-running server.

use alloy_primitives::Address;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Duration;

/// Errors [`ReplayCache::check_and_record`] can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    #[error("timestamp is outside the accepted skew window")]
    OutsideWindow,
    #[error("nonce has already been used")]
    Replayed,
}

/// Shared, read-mostly replay state: every entry-granular mutation is one
/// `DashMap` operation, the same shared read-mostly state `dashmap` is used for in
/// this access pattern.
pub struct ReplayCache {
    skew_ms: i64,
    seen: DashMap<(Address, String), i64>,
}

impl ReplayCache {
    /// `skew` bounds both how far a request's `timestamp` may drift from
    /// "now" and how long a `(signatory, nonce)` pair is remembered.
    pub fn new(skew: Duration) -> Self {
        ReplayCache {
            skew_ms: skew.as_millis() as i64,
            seen: DashMap::new(),
        }
    }

    /// Checks `timestamp_ms` falls within `now_ms ± skew`, then atomically
    /// checks-and-records `(signatory, nonce)`. A request whose timestamp is
    /// out of the window or whose nonce was already seen for this signatory
    /// is rejected without being recorded again.
    pub fn check_and_record(
        &self,
        signatory: Address,
        nonce: &str,
        timestamp_ms: i64,
        now_ms: i64,
    ) -> Result<(), ReplayError> {
        if (now_ms - timestamp_ms).abs() > self.skew_ms {
            return Err(ReplayError::OutsideWindow);
        }
        self.prune(now_ms);
        match self.seen.entry((signatory, nonce.to_string())) {
            Entry::Occupied(_) => Err(ReplayError::Replayed),
            Entry::Vacant(slot) => {
                slot.insert(timestamp_ms);
                Ok(())
            }
        }
    }

    fn prune(&self, now_ms: i64) {
        self.seen.retain(|_, ts| (now_ms - *ts).abs() <= self.skew_ms);
    }

    /// Number of nonces currently remembered, for diagnostics.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
