//! Per-round role derivation.
//!
//! This is the single source of truth for who talks to whom: every
//! participant evaluates [`role`] locally, for itself and (in tests) for any
//! peer, and the answers agree without any communication.

use crate::{Rank, ROOT};

/// What a participant does in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Block for the partner's partial aggregate and fold it in.
    Receive { partner: Rank },
    /// Hand the accumulator to the partner and retire.
    Send { partner: Rank },
    /// No pairing this round.
    Idle,
}

/// Number of rounds needed to drain a group of `group` participants into the
/// root: `ceil(log2(group))`. A singleton group needs none.
pub fn tree_height(group: usize) -> u32 {
    assert!(group >= 1, "an empty group has no topology");
    usize::BITS - (group - 1).leading_zeros()
}

/// Pairing distance in `round`: partners sit `2^round` ranks apart.
pub fn interval(round: u32) -> usize {
    1usize << round
}

/// Role of `rank` in `round` within a group of `group` participants.
///
/// In round `i` only multiples of `2^i` still hold a partial; every odd
/// multiple of `2^i` hands its partial down to the even multiple `2^i`
/// below it and retires. An even multiple whose upper partner would fall
/// outside the group sits the round out and keeps its partial for a later
/// round; pairing it downward instead would address a rank that is itself
/// sending, and the value would never be folded in.
pub fn role(rank: Rank, group: usize, round: u32) -> Role {
    assert!(
        rank < group,
        "rank {} outside a group of {}",
        rank,
        group
    );
    let k = interval(round);

    if rank % k != 0 {
        // retired in an earlier round
        return Role::Idle;
    }

    if rank % (2 * k) == 0 {
        if rank + k < group {
            Role::Receive { partner: rank + k }
        } else {
            Role::Idle
        }
    } else {
        Role::Send { partner: rank - k }
    }
}

/// The one round in which `rank` sends: the number of trailing zero bits in
/// its binary representation. The root never sends.
pub fn send_round(rank: Rank) -> Option<u32> {
    if rank == ROOT {
        None
    } else {
        Some(rank.trailing_zeros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn heights() {
        assert_eq!(tree_height(1), 0);
        assert_eq!(tree_height(2), 1);
        assert_eq!(tree_height(3), 2);
        assert_eq!(tree_height(4), 2);
        assert_eq!(tree_height(5), 3);
        assert_eq!(tree_height(6), 3);
        assert_eq!(tree_height(7), 3);
        assert_eq!(tree_height(8), 3);
        assert_eq!(tree_height(9), 4);
        assert_eq!(tree_height(16), 4);
        assert_eq!(tree_height(17), 5);
    }

    #[test]
    fn role_is_a_pure_function() {
        for &(rank, group, round) in &[(0, 5, 0), (3, 8, 1), (4, 5, 2), (6, 7, 1)] {
            assert_eq!(role(rank, group, round), role(rank, group, round));
        }
    }

    #[test]
    #[should_panic]
    fn out_of_range_rank_is_rejected() {
        role(5, 5, 0);
    }

    #[test]
    fn five_participants_pair_up_as_expected() {
        // round 0: 1->0, 3->2, 4 sits out
        assert_eq!(role(0, 5, 0), Role::Receive { partner: 1 });
        assert_eq!(role(1, 5, 0), Role::Send { partner: 0 });
        assert_eq!(role(2, 5, 0), Role::Receive { partner: 3 });
        assert_eq!(role(3, 5, 0), Role::Send { partner: 2 });
        assert_eq!(role(4, 5, 0), Role::Idle);
        // round 1: 2->0, 4 still waiting
        assert_eq!(role(0, 5, 1), Role::Receive { partner: 2 });
        assert_eq!(role(2, 5, 1), Role::Send { partner: 0 });
        assert_eq!(role(4, 5, 1), Role::Idle);
        // round 2: 4->0 at last
        assert_eq!(role(0, 5, 2), Role::Receive { partner: 4 });
        assert_eq!(role(4, 5, 2), Role::Send { partner: 0 });
    }

    /// Walk every round of every group size and check the global pairing the
    /// local role derivations imply: exact sender/receiver matching each
    /// round, each non-root rank sending exactly once into a still-active
    /// peer, group-1 messages in total, and the root never sending.
    #[test]
    fn pairing_is_exact_for_every_group_size() {
        for group in 1..=64 {
            let mut active = vec![true; group];
            let mut messages = 0;

            for round in 0..tree_height(group) {
                // receiver -> expected sender, sender -> addressed receiver
                let mut expected: HashMap<Rank, Rank> = HashMap::new();
                let mut senders: HashMap<Rank, Rank> = HashMap::new();

                for rank in 0..group {
                    match role(rank, group, round) {
                        Role::Receive { partner } => {
                            assert!(active[rank], "retired rank {} told to receive", rank);
                            assert!(partner < group);
                            expected.insert(rank, partner);
                        }
                        Role::Send { partner } => {
                            assert!(active[rank], "retired rank {} told to send", rank);
                            assert_eq!(send_round(rank), Some(round));
                            senders.insert(rank, partner);
                        }
                        Role::Idle => {}
                    }
                }

                assert_eq!(
                    senders.len(),
                    expected.len(),
                    "group {} round {}: unbalanced pairing",
                    group,
                    round
                );
                for (&sender, &target) in &senders {
                    assert!(active[target], "group {} round {}: rank {} sends into retired rank {}",
                        group, round, sender, target);
                    assert_eq!(
                        expected.get(&target),
                        Some(&sender),
                        "group {} round {}: rank {} addresses rank {} which expects {:?}",
                        group,
                        round,
                        sender,
                        target,
                        expected.get(&target)
                    );
                }

                for &sender in senders.keys() {
                    active[sender] = false;
                    messages += 1;
                }
            }

            assert_eq!(messages, group - 1, "group {}", group);
            assert!(active[ROOT]);
            for rank in 1..group {
                assert!(!active[rank], "group {}: rank {} never sent", group, rank);
            }
        }
    }

    #[test]
    fn root_receives_log2_times_in_power_of_two_groups() {
        for &group in &[2usize, 4, 8, 16] {
            let receives = (0..tree_height(group))
                .filter(|&round| matches!(role(ROOT, group, round), Role::Receive { .. }))
                .count();
            assert_eq!(receives as u32, tree_height(group));
        }
    }
}
