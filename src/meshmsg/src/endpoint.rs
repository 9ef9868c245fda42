//! Nonblocking framed endpoint for multiplexed control-plane traffic.
//!
//! The controller watches every member at once through a `mio` poll loop, so
//! its streams cannot block. A partial read or write resumes exactly where
//! it left off on the next readiness event; framing state lives in
//! [`Buffer`] cursors.

use crate::buffer::Buffer;
use mio::net::TcpStream;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::VecDeque;
use std::convert::TryInto;
use std::io::{Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("operation would block")]
    WouldBlock,
    #[error("transmit queue is empty")]
    NothingToSend,
    #[error("connection has been dropped")]
    ConnectionLost,
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("deserialize failed: {0}")]
    Deserialize(bincode::Error),
}

type Result<T> = std::result::Result<T, Error>;

pub struct Endpoint {
    stream: TcpStream,
    tx_queue: VecDeque<Buffer>,
    state: ReceiveState,
    frame_len: Buffer,
    frame_payload: Buffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReceiveState {
    RecvLength,
    RecvPayload,
}

impl Endpoint {
    pub fn new(stream: std::net::TcpStream) -> std::io::Result<Self> {
        Ok(Endpoint {
            // this also flips the stream to nonblocking
            stream: TcpStream::from_stream(stream)?,
            tx_queue: Default::default(),
            state: ReceiveState::RecvLength,
            frame_len: Buffer::zeroed(std::mem::size_of::<u64>()),
            frame_payload: Buffer::default(),
        })
    }

    #[inline]
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    #[inline]
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Queue a message. Nothing hits the wire until the stream reports
    /// writable and [`on_send_ready`](Self::on_send_ready) runs.
    pub fn post(&mut self, cmd: impl Serialize + std::fmt::Debug) -> anyhow::Result<()> {
        log::trace!("posting a cmd: {:?}", cmd);
        let buf = bincode::serialize(&cmd)?;
        let len_buf = (buf.len() as u64).to_be_bytes();
        self.tx_queue.push_back(Buffer::from_vec(len_buf.into()));
        self.tx_queue.push_back(Buffer::from_vec(buf));
        Ok(())
    }

    /// Flush as much of the transmit queue as the socket accepts. `Ok(())`
    /// means everything queued so far is on the wire.
    pub fn on_send_ready(&mut self) -> Result<()> {
        if self.tx_queue.is_empty() {
            return Err(Error::NothingToSend);
        }

        while let Some(buffer) = self.tx_queue.front_mut() {
            if buffer.is_done() {
                self.tx_queue.pop_front();
                continue;
            }

            Self::write_some(&mut self.stream, buffer)?;
        }

        Ok(())
    }

    /// Continue receiving the frame in progress; returns the decoded message
    /// once it is complete.
    pub fn on_recv_ready<T: DeserializeOwned + std::fmt::Debug>(&mut self) -> Result<T> {
        use ReceiveState::*;
        match self.state {
            RecvLength => {
                self.recv_frame_len()?;
                self.recv_frame_payload()?;
            }
            RecvPayload => {
                self.recv_frame_payload()?;
            }
        }

        // here we have an entire frame
        let cmd = bincode::deserialize(self.frame_payload.bytes()).map_err(Error::Deserialize)?;
        log::trace!("on_recv_ready: cmd: {:?}", cmd);

        Ok(cmd)
    }

    fn read_some(stream: &mut TcpStream, buffer: &mut Buffer) -> Result<usize> {
        match stream.read(buffer.remaining_mut()) {
            Ok(0) => Err(Error::ConnectionLost),
            Ok(nbytes) => {
                buffer.advance(nbytes);
                Ok(nbytes)
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(Error::WouldBlock),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn write_some(stream: &mut TcpStream, buffer: &mut Buffer) -> Result<usize> {
        match stream.write(buffer.remaining()) {
            Ok(nbytes) => {
                buffer.advance(nbytes);
                Ok(nbytes)
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(Error::WouldBlock),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn recv_frame_len(&mut self) -> Result<()> {
        loop {
            Self::read_some(&mut self.stream, &mut self.frame_len)?;

            if self.frame_len.is_done() {
                // prepare the payload buffer
                let frame_len =
                    u64::from_be_bytes(self.frame_len.bytes().try_into().unwrap()) as usize;
                self.frame_payload = Buffer::zeroed(frame_len);

                self.state = ReceiveState::RecvPayload;
                break Ok(());
            }
        }
    }

    fn recv_frame_payload(&mut self) -> Result<()> {
        loop {
            Self::read_some(&mut self.stream, &mut self.frame_payload)?;

            if self.frame_payload.is_done() {
                // rearm for the next length prefix
                self.frame_len = Buffer::zeroed(std::mem::size_of::<u64>());

                self.state = ReceiveState::RecvLength;
                break Ok(());
            }
        }
    }
}
