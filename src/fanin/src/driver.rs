//! The per-participant control loop.

use crate::topology::{role, tree_height, Role};
use crate::{Fabric, GroupError, Rank, Value, ROOT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Active,
    /// Sent its partial upstream; takes no further part in the protocol and
    /// its accumulator is no longer authoritative.
    Retired,
}

#[derive(Debug)]
pub struct Participant {
    rank: Rank,
    group: usize,
    total: Value,
    state: State,
}

impl Participant {
    pub fn new(rank: Rank, group: usize, contribution: Value) -> Result<Self, GroupError> {
        if group == 0 {
            return Err(GroupError::Empty);
        }
        if rank >= group {
            return Err(GroupError::RankOutOfRange { rank, group });
        }
        Ok(Participant {
            rank,
            group,
            total: contribution,
            state: State::Active,
        })
    }

    #[inline]
    pub fn rank(&self) -> Rank {
        self.rank
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    /// Run every round of the fan-in. Returns the global aggregate on the
    /// root and `None` everywhere else.
    ///
    /// A round's action must resolve before the next round's role is even
    /// evaluated: the loop is strictly sequential per participant, and the
    /// blocking `recv` of the fabric is the only synchronization used.
    pub fn run(&mut self, fabric: &mut dyn Fabric) -> anyhow::Result<Option<Value>> {
        let height = tree_height(self.group);
        log::debug!(
            "rank {}: starting a fan-in over {} participants, {} rounds",
            self.rank,
            self.group,
            height
        );

        for round in 0..height {
            if self.state == State::Retired {
                break;
            }
            let role = role(self.rank, self.group, round);
            log::trace!("rank {}: round {}: {:?}", self.rank, round, role);
            self.step(round, role, fabric)?;
        }

        if self.rank == ROOT {
            Ok(Some(self.total))
        } else {
            Ok(None)
        }
    }

    /// Execute one round's role.
    fn step(&mut self, round: u32, role: Role, fabric: &mut dyn Fabric) -> anyhow::Result<()> {
        match role {
            Role::Receive { partner } => {
                let partial = fabric.recv(partner, round)?;
                self.total += partial;
                log::trace!(
                    "rank {}: folded {} from rank {}, accumulator now {}",
                    self.rank,
                    partial,
                    partner,
                    self.total
                );
            }
            Role::Send { partner } => {
                fabric.send(partner, round, self.total)?;
                self.state = State::Retired;
            }
            Role::Idle => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted fabric for driving a single participant without peers.
    struct Script {
        recvs: Vec<(Rank, u32, Value)>,
        sends: Vec<(Rank, u32, Value)>,
    }

    impl Script {
        fn new(recvs: Vec<(Rank, u32, Value)>) -> Self {
            Script {
                recvs,
                sends: Vec::new(),
            }
        }
    }

    impl Fabric for Script {
        fn send(&mut self, to: Rank, round: u32, value: Value) -> anyhow::Result<()> {
            self.sends.push((to, round, value));
            Ok(())
        }

        fn recv(&mut self, from: Rank, round: u32) -> anyhow::Result<Value> {
            let (expected_from, expected_round, value) = self.recvs.remove(0);
            assert_eq!((from, round), (expected_from, expected_round));
            Ok(value)
        }
    }

    #[test]
    fn group_preconditions_fail_fast() {
        assert_eq!(Participant::new(0, 0, 0.0).unwrap_err(), GroupError::Empty);
        assert_eq!(
            Participant::new(3, 3, 0.0).unwrap_err(),
            GroupError::RankOutOfRange { rank: 3, group: 3 }
        );
    }

    #[test]
    fn singleton_root_needs_no_rounds() {
        let mut script = Script::new(vec![]);
        let mut p = Participant::new(0, 1, 42.5).unwrap();
        assert_eq!(p.run(&mut script).unwrap(), Some(42.5));
        assert!(script.sends.is_empty());
        assert_eq!(p.state(), State::Active);
    }

    #[test]
    fn root_of_five_folds_three_partials() {
        // peers deliver: 1 in round 0, 2+3 in round 1, 4 in round 2
        let mut script = Script::new(vec![(1, 0, 1.0), (2, 1, 5.0), (4, 2, 4.0)]);
        let mut p = Participant::new(0, 5, 0.0).unwrap();
        assert_eq!(p.run(&mut script).unwrap(), Some(10.0));
        assert!(script.recvs.is_empty());
    }

    #[test]
    fn odd_rank_sends_once_and_retires() {
        let mut script = Script::new(vec![]);
        let mut p = Participant::new(3, 8, 3.0).unwrap();
        assert_eq!(p.run(&mut script).unwrap(), None);
        assert_eq!(script.sends, vec![(2, 0, 3.0)]);
        assert_eq!(p.state(), State::Retired);
    }

    #[test]
    fn straggler_rank_waits_for_its_round() {
        // rank 4 of 5 idles through rounds 0 and 1, then sends to the root
        let mut script = Script::new(vec![]);
        let mut p = Participant::new(4, 5, 4.0).unwrap();
        assert_eq!(p.run(&mut script).unwrap(), None);
        assert_eq!(script.sends, vec![(0, 2, 4.0)]);
        assert_eq!(p.state(), State::Retired);
    }

    #[test]
    fn mid_tree_rank_receives_then_forwards() {
        // rank 2 of 8: folds 3's partial in round 0, hands 5.0 to 0 in round 1
        let mut script = Script::new(vec![(3, 0, 3.0)]);
        let mut p = Participant::new(2, 8, 2.0).unwrap();
        assert_eq!(p.run(&mut script).unwrap(), None);
        assert_eq!(script.sends, vec![(0, 1, 5.0)]);
        assert_eq!(p.state(), State::Retired);
    }
}
