//! Point-to-point messaging among a fixed group of rank-identified peers.
//!
//! A group comes up in two phases. First every member dials the controller
//! and announces itself; the controller waits for the full roster, sorts it,
//! and broadcasts the peer list, which fixes every member's rank. Second,
//! each member establishes one TCP stream per peer with [`connect_mesh`].
//! After that, the data plane is plain blocking framed messages over the
//! per-peer streams (see [`wire`]); the controller keeps its per-member
//! streams for run monitoring (see [`endpoint`]).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{TcpListener, TcpStream};
use thiserror::Error;

pub mod buffer;
pub mod command;
pub mod endpoint;
pub mod wire;

/// A reachable group member. Ranks are not stored here: a member's rank is
/// its position in the sorted peer list, so every member derives the same
/// ranking without further communication.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Node {
    pub addr: String,
    pub port: u16,
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

#[derive(Debug, Error)]
#[error("invalid node address: {0}")]
pub struct ParseNodeError(String);

impl std::str::FromStr for Node {
    type Err = ParseNodeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, port) = s.rsplit_once(':').ok_or_else(|| ParseNodeError(s.to_owned()))?;
        Ok(Node {
            addr: addr.to_owned(),
            port: port.parse().map_err(|_| ParseNodeError(s.to_owned()))?,
        })
    }
}

impl std::net::ToSocketAddrs for Node {
    type Iter = std::vec::IntoIter<std::net::SocketAddr>;
    fn to_socket_addrs(&self) -> std::io::Result<Self::Iter> {
        (&*self.addr, self.port).to_socket_addrs()
    }
}

/// Position of `my_node` in the broadcast peer list. The list is sorted by
/// the controller, so the result is identical on every member.
pub fn rank_of(my_node: &Node, nodes: &[Node]) -> usize {
    nodes
        .iter()
        .position(|n| n == my_node)
        .unwrap_or_else(|| panic!("node {} not in the peer list {:?}", my_node, nodes))
}

/// Controller half of the rendezvous. Binds `uri`, accepts `Join`s until the
/// roster has `group_size` members, then broadcasts the sorted peer list.
/// Returns the listener and the per-member control streams keyed by node.
pub fn assemble_group(
    uri: &str,
    group_size: usize,
) -> anyhow::Result<(TcpListener, HashMap<Node, TcpStream>)> {
    log::debug!("binding the rendezvous listener to {}", uri);
    let listener = TcpListener::bind(uri)?;

    let mut members: HashMap<Node, TcpStream> = Default::default();
    while members.len() < group_size {
        let (mut client, addr) = listener.accept()?;
        log::debug!("incoming rendezvous connection from {}", addr);

        match wire::recv_cmd(&mut client)? {
            command::Command::Join(node) => {
                log::trace!("{} joined ({}/{})", node, members.len() + 1, group_size);
                if members.insert(node.clone(), client).is_some() {
                    anyhow::bail!("duplicated Join from {}", node);
                }
            }
            cmd => anyhow::bail!("unexpected command during rendezvous: {:?}", cmd),
        }
    }

    let mut nodes: Vec<Node> = members.keys().cloned().collect();
    // the sorted order defines ranks, so it must be the same everywhere
    nodes.sort();
    let cmd = command::Command::Peers(nodes);
    log::debug!("broadcasting the peer list: {:?}", cmd);

    for member in members.values_mut() {
        wire::send_cmd(member, &cmd)?;
    }

    Ok((listener, members))
}

/// Member half of the rendezvous. Binds a listener for later mesh traffic,
/// announces itself to the controller, and blocks until the peer list
/// arrives. Returns (peers, my_node, controller stream, mesh listener).
pub fn join_group(
    controller_uri: &str,
) -> anyhow::Result<(Vec<Node>, Node, TcpStream, TcpListener)> {
    let port = wire::find_avail_port()?;
    log::debug!("binding the mesh listener to port {}", port);
    let listener = TcpListener::bind(("0.0.0.0", port))?;

    let mut controller = wire::connect_retry(controller_uri, 10)?;

    let my_node = Node {
        addr: controller.local_addr()?.ip().to_string(),
        port,
    };

    wire::send_cmd(&mut controller, &command::Command::Join(my_node.clone()))?;

    match wire::recv_cmd(&mut controller)? {
        command::Command::Peers(nodes) => Ok((nodes, my_node, controller, listener)),
        cmd => anyhow::bail!("unexpected command while waiting for the peer list: {:?}", cmd),
    }
}

/// Establish one stream per peer, keyed by rank. Connections from lower
/// ranks are accepted passively, each identified by the `PeerHello` it opens
/// with; higher ranks are dialed actively in ascending order, `PeerHello`
/// first. Accept order does not matter because of the hello.
pub fn connect_mesh(
    nodes: &[Node],
    my_node: &Node,
    listener: &TcpListener,
) -> anyhow::Result<HashMap<usize, TcpStream>> {
    let my_rank = rank_of(my_node, nodes);
    let mut peers: HashMap<usize, TcpStream> = Default::default();

    log::debug!("expecting mesh connections from {} lower ranks", my_rank);
    for _ in 0..my_rank {
        let (mut stream, addr) = listener.accept()?;
        log::debug!("accepted a mesh connection from {}", addr);

        match wire::recv_cmd(&mut stream)? {
            command::Command::PeerHello(node) => {
                let rank = rank_of(&node, nodes);
                if peers.insert(rank, stream).is_some() {
                    anyhow::bail!("duplicated PeerHello from rank {}", rank);
                }
            }
            cmd => anyhow::bail!("unexpected command during mesh setup: {:?}", cmd),
        }
    }

    for (rank, node) in nodes.iter().enumerate().skip(my_rank + 1) {
        log::debug!("dialing rank {} at {}", rank, node);
        let mut stream = TcpStream::connect(node)?;
        wire::send_cmd(&mut stream, &command::Command::PeerHello(my_node.clone()))?;
        peers.insert(rank, stream);
    }

    Ok(peers)
}
