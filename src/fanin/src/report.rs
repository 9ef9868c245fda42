//! Final-result publishing. Only the root has anything to say; every other
//! participant is silent on success.

use crate::{Rank, Value, ROOT};

/// Closed-form total for the self-verifying setup where every contribution
/// equals its rank: `0 + 1 + ... + (group-1)`.
pub fn rank_sum(group: usize) -> Value {
    (group * group.saturating_sub(1) / 2) as Value
}

/// Print the final aggregate, with the caller-supplied expected value when
/// one is known. A no-op on every rank but the root.
pub fn publish(rank: Rank, total: Value, expected: Option<Value>) {
    if rank != ROOT {
        return;
    }
    match expected {
        Some(expected) => println!("global sum = {} (expected {})", total, expected),
        None => println!("global sum = {}", total),
    }
}
