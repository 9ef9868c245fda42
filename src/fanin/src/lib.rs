//! Tree-structured fan-in reduction over point-to-point messages.
//!
//! Every participant runs the same code and diverges only by its computed
//! role: in round `i` the still-active ranks pair up at distance `2^i`, the
//! upper half of each pair hands its partial aggregate down and retires, and
//! after `ceil(log2(p))` rounds rank 0 holds the global aggregate. Pairings
//! are derived locally by every participant from [`topology::role`]; no
//! central coordination happens at run time, so the whole protocol stands or
//! falls with that one pure function.

use thiserror::Error;

pub mod driver;
pub mod local;
pub mod report;
pub mod topology;

pub use driver::{Participant, State};
pub use topology::{interval, role, tree_height, Role};

/// A participant's identity within the group, in `[0, group)`.
pub type Rank = usize;

/// The scalar being aggregated.
pub type Value = f64;

/// Every partial aggregate fans in to this rank.
pub const ROOT: Rank = 0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupError {
    #[error("a reduction group must contain at least one participant")]
    Empty,
    #[error("rank {rank} is outside the group [0, {group})")]
    RankOutOfRange { rank: Rank, group: usize },
}

/// Point-to-point substrate the round executor drives.
///
/// `send` is logically fire-and-forget: the protocol never waits for a send
/// to be acknowledged, though the transport underneath may block on buffer
/// space. `recv` blocks until the partial from exactly `from` arrives.
/// Every message carries the sender's round index; a receiver seeing any
/// other round tag must fail the run rather than fold in a misrouted value.
pub trait Fabric {
    fn send(&mut self, to: Rank, round: u32, value: Value) -> anyhow::Result<()>;
    fn recv(&mut self, from: Rank, round: u32) -> anyhow::Result<Value>;
}
