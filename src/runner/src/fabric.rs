//! The TCP rendition of the reduction fabric: one blocking stream per peer,
//! established by `meshmsg::connect_mesh`, carrying round-tagged partials.

use crate::message;
use fanin::{Fabric, Rank, Value};
use meshmsg::wire;
use std::collections::HashMap;
use std::net::TcpStream;

pub struct MeshFabric {
    peers: HashMap<Rank, TcpStream>,
}

impl MeshFabric {
    pub fn new(peers: HashMap<Rank, TcpStream>) -> Self {
        MeshFabric { peers }
    }

    fn peer(&mut self, rank: Rank) -> anyhow::Result<&mut TcpStream> {
        self.peers
            .get_mut(&rank)
            .ok_or_else(|| anyhow::anyhow!("no connection to rank {}", rank))
    }
}

impl Fabric for MeshFabric {
    fn send(&mut self, to: Rank, round: u32, value: Value) -> anyhow::Result<()> {
        let stream = self.peer(to)?;
        wire::send_cmd(stream, &message::Command::Partial { round, value })
    }

    fn recv(&mut self, from: Rank, round: u32) -> anyhow::Result<Value> {
        let stream = self.peer(from)?;
        match wire::recv_cmd(stream)? {
            message::Command::Partial { round: got, value } => {
                anyhow::ensure!(
                    got == round,
                    "partial from rank {} is tagged round {} but this rank is in round {}",
                    from,
                    got,
                    round
                );
                Ok(value)
            }
            cmd => anyhow::bail!("unexpected command from rank {}: {:?}", from, cmd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_pair() -> (TcpStream, TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let dialer = std::thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (accepted, _) = listener.accept().unwrap();
        (accepted, dialer.join().unwrap())
    }

    #[test]
    fn partials_cross_the_wire() {
        let (left, right) = stream_pair();
        let mut rank0 = MeshFabric::new(vec![(1, left)].into_iter().collect());
        let mut rank1 = MeshFabric::new(vec![(0, right)].into_iter().collect());

        rank1.send(0, 0, 4.0).unwrap();
        assert_eq!(rank0.recv(1, 0).unwrap(), 4.0);
    }

    #[test]
    fn round_tag_mismatch_is_fatal() {
        let (left, right) = stream_pair();
        let mut rank0 = MeshFabric::new(vec![(1, left)].into_iter().collect());
        let mut rank1 = MeshFabric::new(vec![(0, right)].into_iter().collect());

        rank1.send(0, 2, 4.0).unwrap();
        assert!(rank0.recv(1, 0).is_err());
    }

    #[test]
    fn unknown_peers_are_rejected() {
        let mut fabric = MeshFabric::new(Default::default());
        assert!(fabric.send(3, 0, 1.0).is_err());
        assert!(fabric.recv(3, 0).is_err());
    }
}
