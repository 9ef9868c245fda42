use crate::Node;
use fanin::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// one round's partial aggregate, sent between paired workers
    Partial { round: u32, value: Value },
    /// the final aggregate, sent by the root worker to the controller
    Total {
        value: Value,
        expected: Option<Value>,
    },
    /// sent by a worker once its part is done, processed by the controller
    Leave(Node),
    /// sent by the controller after the whole group has finished
    Shutdown,
}
