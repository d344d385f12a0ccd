//! Per-worker counters.
//!
//! Drops and losses have no return channel (the consumer loop runs forever),
//! so besides the logs these counters are the only way to observe them.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`ConsumerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerCounts {
    pub polls: u64,
    pub empty: u64,
    pub claimed: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub dropped: u64,
    pub lost: u64,
    pub corrupt: u64,
    pub claim_errors: u64,
}

#[derive(Debug, Default)]
pub struct ConsumerStats {
    polls: AtomicU64,
    empty: AtomicU64,
    claimed: AtomicU64,
    succeeded: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
    lost: AtomicU64,
    corrupt: AtomicU64,
    claim_errors: AtomicU64,
}

macro_rules! bump {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub(crate) fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl ConsumerStats {
    bump! {
        record_poll => polls,
        record_empty => empty,
        record_claimed => claimed,
        record_succeeded => succeeded,
        record_retried => retried,
        record_dropped => dropped,
        record_lost => lost,
        record_corrupt => corrupt,
        record_claim_error => claim_errors,
    }

    pub fn snapshot(&self) -> ConsumerCounts {
        ConsumerCounts {
            polls: self.polls.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            claimed: self.claimed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
            corrupt: self.corrupt.load(Ordering::Relaxed),
            claim_errors: self.claim_errors.load(Ordering::Relaxed),
        }
    }
}
