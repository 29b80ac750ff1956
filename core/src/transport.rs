//! Network interface abstraction: broadcast discovery plus per-party unicast.
//!
//! The reference implementation ([`Link.py`]) opens a single UDP socket with
//! `SO_BROADCAST` and resolves party ids to addresses as parties announce themselves.
//! [`UdpTransport`] mirrors that. [`MockTransport`] gives the peer driver the same
//! interface over in-process channels for tests, in the spirit of the teacher's
//! `mock_multiparty_channels` helper.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::wire::Frame;
use crate::PeerId;

/// UDP port the reference implementation's parties listen and broadcast on.
pub const MPC_PORT: u16 = 5005;

/// Broadcast address used to reach every party on the local network.
pub const BROADCAST_ADDR: &str = "255.255.255.255";

/// What the peer driver needs from a network: broadcast, unicast and receive.
pub trait Transport {
    /// Send `frame` to every reachable party.
    async fn broadcast(&self, frame: &Frame) -> io::Result<()>;

    /// Send `frame` to a single, already-known party.
    async fn send_to(&self, to: PeerId, frame: &Frame) -> io::Result<()>;

    /// Block until the next frame arrives.
    async fn recv(&self) -> io::Result<Frame>;

    /// Record the address a party id should be reached at.
    fn register_party(&self, id: PeerId, addr: SocketAddr);
}

fn encode_err(e: crate::error::FrameError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// Real UDP socket transport, matching the reference's `NetworkInterface`.
pub struct UdpTransport {
    socket: UdpSocket,
    parties: Mutex<HashMap<PeerId, SocketAddr>>,
}

impl UdpTransport {
    pub async fn bind(port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        socket.set_broadcast(true)?;
        Ok(UdpTransport {
            socket,
            parties: Mutex::new(HashMap::new()),
        })
    }
}

impl Transport for UdpTransport {
    async fn broadcast(&self, frame: &Frame) -> io::Result<()> {
        let bytes = frame.encode().map_err(encode_err)?;
        self.socket
            .send_to(&bytes, (BROADCAST_ADDR, MPC_PORT))
            .await?;
        Ok(())
    }

    async fn send_to(&self, to: PeerId, frame: &Frame) -> io::Result<()> {
        let addr = *self
            .parties
            .lock()
            .unwrap()
            .get(&to)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("unknown party {to}")))?;
        let bytes = frame.encode().map_err(encode_err)?;
        self.socket.send_to(&bytes, addr).await?;
        Ok(())
    }

    async fn recv(&self) -> io::Result<Frame> {
        let mut buf = [0u8; 1024];
        let (len, from) = self.socket.recv_from(&mut buf).await?;
        let frame = Frame::decode(&buf[..len]).map_err(encode_err)?;
        self.register_party(frame.origin, from);
        Ok(frame)
    }

    fn register_party(&self, id: PeerId, addr: SocketAddr) {
        self.parties.lock().unwrap().insert(id, addr);
    }
}

type Senders = Arc<Mutex<HashMap<PeerId, mpsc::UnboundedSender<Frame>>>>;

/// Shared registry backing a set of [`MockTransport`]s in the same test process.
#[derive(Clone, Default)]
pub struct MockNetwork {
    senders: Senders,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a transport for `id`.
    pub fn transport(&self, id: PeerId) -> MockTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().insert(id, tx);
        MockTransport {
            id,
            senders: self.senders.clone(),
            inbox: AsyncMutex::new(rx),
        }
    }
}

/// In-process stand-in for [`UdpTransport`], addressed directly by party id.
pub struct MockTransport {
    id: PeerId,
    senders: Senders,
    inbox: AsyncMutex<mpsc::UnboundedReceiver<Frame>>,
}

impl Transport for MockTransport {
    async fn broadcast(&self, frame: &Frame) -> io::Result<()> {
        let targets: Vec<_> = self
            .senders
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| **id != self.id)
            .map(|(_, tx)| tx.clone())
            .collect();
        for tx in targets {
            let _ = tx.send(frame.clone());
        }
        Ok(())
    }

    async fn send_to(&self, to: PeerId, frame: &Frame) -> io::Result<()> {
        let tx = self
            .senders
            .lock()
            .unwrap()
            .get(&to)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("unknown party {to}")))?;
        tx.send(frame.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer dropped"))
    }

    async fn recv(&self) -> io::Result<Frame> {
        self.inbox
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "transport closed"))
    }

    fn register_party(&self, _id: PeerId, _addr: SocketAddr) {}
}
