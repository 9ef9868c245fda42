//! Blocking framed messaging: a `u64` big-endian length prefix followed by a
//! bincode payload. These APIs require the socket in blocking mode.

use serde::{de::DeserializeOwned, Serialize};
use std::convert::TryInto;
use std::io::{Read, Write};
use std::net::TcpStream;

pub fn read_be_u64(input: &[u8]) -> u64 {
    // the caller always hands in exactly 8 bytes
    u64::from_be_bytes(input.try_into().unwrap())
}

pub fn read_frame_len(stream: &mut TcpStream) -> anyhow::Result<u64> {
    let mut buf = [0u8; 8];
    stream.read_exact(&mut buf)?;
    Ok(read_be_u64(&buf))
}

pub fn recv_frame(stream: &mut TcpStream) -> anyhow::Result<Vec<u8>> {
    let frame_len = read_frame_len(stream)? as usize;
    let mut buf = vec![0u8; frame_len];
    stream.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn send_frame(stream: &mut TcpStream, buf: &[u8]) -> anyhow::Result<()> {
    let len_buf = (buf.len() as u64).to_be_bytes();
    stream.write_all(&len_buf)?;
    stream.write_all(buf)?;
    Ok(())
}

pub fn recv_cmd<T: DeserializeOwned>(stream: &mut TcpStream) -> anyhow::Result<T> {
    let buf = recv_frame(stream)?;
    let cmd = bincode::deserialize(&buf)?;
    Ok(cmd)
}

pub fn send_cmd(stream: &mut TcpStream, cmd: &impl Serialize) -> anyhow::Result<()> {
    let buf = bincode::serialize(cmd)?;
    send_frame(stream, &buf)
}

const BASE_PORT: u16 = 30000;
const MAX_RETRY: u16 = 100;

pub fn find_avail_port() -> anyhow::Result<u16> {
    let mut port = BASE_PORT;
    let mut max_retries = MAX_RETRY;

    loop {
        match std::net::TcpListener::bind(("0.0.0.0", port)) {
            Ok(_) => {
                break;
            }
            Err(e) => {
                port += 1;
                max_retries -= 1;
                if max_retries == 0 {
                    return Err(e.into());
                }
            }
        }
    }

    Ok(port)
}

pub fn connect_retry(uri: &str, max_retry: usize) -> anyhow::Result<TcpStream> {
    let mut retry = max_retry;
    let mut sleep_time = std::time::Duration::from_millis(5);
    loop {
        match TcpStream::connect(uri) {
            Ok(stream) => {
                return Ok(stream);
            }
            Err(e) => {
                if retry == 0 {
                    return Err(anyhow::anyhow!(
                        "failed to connect to {} after {} retries: {}",
                        uri,
                        max_retry,
                        e
                    ));
                }
                std::thread::sleep(sleep_time);
                sleep_time *= 2;
                retry -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::Node;

    #[test]
    fn frames_round_trip_over_a_socket() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let echo = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let cmd: Command = recv_cmd(&mut stream).unwrap();
            send_cmd(&mut stream, &cmd).unwrap();
        });

        let me = Node {
            addr: "127.0.0.1".to_owned(),
            port: 4242,
        };
        let mut stream = TcpStream::connect(addr).unwrap();
        send_cmd(&mut stream, &Command::Join(me.clone())).unwrap();

        match recv_cmd::<Command>(&mut stream).unwrap() {
            Command::Join(node) => assert_eq!(node, me),
            cmd => panic!("unexpected echo: {:?}", cmd),
        }
        echo.join().unwrap();
    }

    #[test]
    fn empty_frames_are_legal() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            recv_frame(&mut stream).unwrap()
        });

        let mut stream = TcpStream::connect(addr).unwrap();
        send_frame(&mut stream, &[]).unwrap();
        assert!(peer.join().unwrap().is_empty());
    }
}
