use crate::Node;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// sent by a member, processed by the controller
    Join(Node),
    /// sent by the controller, processed by members; order defines ranks
    Peers(Vec<Node>),
    /// sent by a member, processed by a peer member during mesh setup
    PeerHello(Node),
}
