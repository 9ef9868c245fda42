//! Deployment of a fan-in reduction group as real processes: a `controller`
//! that hosts the rendezvous and monitors the run, one `worker` per
//! participant, and a `launch` binary that spawns the whole group locally.

pub use meshmsg::Node;

pub mod fabric;
pub mod message;

/// Environment prepared by `launch` for every process it spawns.
pub const CONTROLLER_URI_ENV: &str = "FANIN_CONTROLLER_URI";
pub const GROUP_SIZE_ENV: &str = "FANIN_GROUP_SIZE";
/// Overrides the default contribution (the worker's own rank).
pub const CONTRIBUTION_ENV: &str = "FANIN_CONTRIBUTION";
/// Tag prepended to every log line; see the `logging` crate.
pub const LOG_SCOPE_ENV: &str = "FANIN_LOG_SCOPE";
