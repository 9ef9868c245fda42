//! In-process reduction groups: one OS thread per participant, one dedicated
//! channel per ordered rank pair so a receive can only ever observe its
//! exact partner. Used by the integration tests and as a harness for
//! running a whole group without any networking.

use crate::driver::Participant;
use crate::{Fabric, GroupError, Rank, Value, ROOT};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::collections::HashMap;

pub struct ChannelFabric {
    rank: Rank,
    txs: HashMap<Rank, Sender<(u32, Value)>>,
    rxs: HashMap<Rank, Receiver<(u32, Value)>>,
}

impl Fabric for ChannelFabric {
    fn send(&mut self, to: Rank, round: u32, value: Value) -> anyhow::Result<()> {
        let tx = self
            .txs
            .get(&to)
            .ok_or_else(|| anyhow::anyhow!("rank {} has no channel to rank {}", self.rank, to))?;
        tx.send((round, value))
            .map_err(|_| anyhow::anyhow!("rank {} is gone", to))?;
        Ok(())
    }

    fn recv(&mut self, from: Rank, round: u32) -> anyhow::Result<Value> {
        let rx = self
            .rxs
            .get(&from)
            .ok_or_else(|| anyhow::anyhow!("rank {} has no channel from rank {}", self.rank, from))?;
        let (got, value) = rx
            .recv()
            .map_err(|_| anyhow::anyhow!("rank {} went away before sending its partial", from))?;
        anyhow::ensure!(
            got == round,
            "partial from rank {} is tagged round {} but rank {} is in round {}",
            from,
            got,
            self.rank,
            round
        );
        Ok(value)
    }
}

/// Build the full mesh of channels for a group of `group` participants.
pub fn mesh(group: usize) -> Vec<ChannelFabric> {
    let mut txs: Vec<HashMap<Rank, Sender<(u32, Value)>>> =
        (0..group).map(|_| Default::default()).collect();
    let mut rxs: Vec<HashMap<Rank, Receiver<(u32, Value)>>> =
        (0..group).map(|_| Default::default()).collect();

    for from in 0..group {
        for to in 0..group {
            if from == to {
                continue;
            }
            let (tx, rx) = unbounded();
            txs[from].insert(to, tx);
            rxs[to].insert(from, rx);
        }
    }

    txs.into_iter()
        .zip(rxs)
        .enumerate()
        .map(|(rank, (txs, rxs))| ChannelFabric { rank, txs, rxs })
        .collect()
}

/// Run a whole reduction group in-process and return the root's aggregate.
/// `contributions[rank]` seeds each participant's accumulator.
pub fn run_group(contributions: &[Value]) -> anyhow::Result<Value> {
    if contributions.is_empty() {
        return Err(GroupError::Empty.into());
    }
    let group = contributions.len();

    let mut handles = Vec::with_capacity(group);
    for (rank, (mut fabric, &contribution)) in
        mesh(group).into_iter().zip(contributions).enumerate()
    {
        handles.push(std::thread::spawn(
            move || -> anyhow::Result<Option<Value>> {
                let mut participant = Participant::new(rank, group, contribution)?;
                participant.run(&mut fabric)
            },
        ));
    }

    let mut total = None;
    for (rank, handle) in handles.into_iter().enumerate() {
        let outcome = handle
            .join()
            .unwrap_or_else(|e| panic!("participant {} panicked: {:?}", rank, e))?;
        if rank == ROOT {
            total = outcome;
        } else {
            assert!(outcome.is_none());
        }
    }

    total.ok_or_else(|| anyhow::anyhow!("the root finished without an aggregate"))
}
