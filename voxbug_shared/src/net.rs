//! Networking primitives.
//!
//! Goals:
//! - One unreliable datagram transport behind a trait, so the agent loop can
//!   be driven by an in-memory fake in tests.
//! - Protocol constants (packet types, node types) in one place.
//! - Process-wide send counters.
//!
//! All multi-byte wire fields are little-endian.

use std::{
    io,
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::Context;
use async_trait::async_trait;
use bytes::BufMut;
use thiserror::Error;
use tokio::net::UdpSocket;

/// Largest datagram the agent will build or accept.
pub const MAX_PACKET_SIZE: usize = 1500;

pub const PACKET_TYPE_ERASE_VOXEL: u8 = b'E';
pub const PACKET_TYPE_SET_VOXEL_DESTRUCTIVE: u8 = b'O';
pub const PACKET_TYPE_DOMAIN_LIST_REQUEST: u8 = b'L';
pub const PACKET_TYPE_DOMAIN: u8 = b'D';
pub const PACKET_TYPE_INJECT_AUDIO: u8 = b'I';
pub const PACKET_TYPE_PING: u8 = b'P';

/// Role a node plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    DomainServer,
    VoxelServer,
    AudioMixer,
    AvatarMixer,
    Agent,
}

impl NodeType {
    pub const ALL: [NodeType; 5] = [
        NodeType::DomainServer,
        NodeType::VoxelServer,
        NodeType::AudioMixer,
        NodeType::AvatarMixer,
        NodeType::Agent,
    ];

    /// Single-byte tag used on the wire.
    pub fn as_byte(self) -> u8 {
        match self {
            NodeType::DomainServer => b'D',
            NodeType::VoxelServer => b'V',
            NodeType::AudioMixer => b'M',
            NodeType::AvatarMixer => b'W',
            NodeType::Agent => b'I',
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_byte() == b)
    }

    pub fn flag(self) -> NodeTypes {
        match self {
            NodeType::DomainServer => NodeTypes::DOMAIN_SERVER,
            NodeType::VoxelServer => NodeTypes::VOXEL_SERVER,
            NodeType::AudioMixer => NodeTypes::AUDIO_MIXER,
            NodeType::AvatarMixer => NodeTypes::AVATAR_MIXER,
            NodeType::Agent => NodeTypes::AGENT,
        }
    }
}

bitflags::bitflags! {
    /// Set of node types, used for "types of interest".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeTypes: u8 {
        const DOMAIN_SERVER = 1 << 0;
        const VOXEL_SERVER = 1 << 1;
        const AUDIO_MIXER = 1 << 2;
        const AVATAR_MIXER = 1 << 3;
        const AGENT = 1 << 4;
    }
}

impl NodeTypes {
    /// Member node types in wire order.
    pub fn types(self) -> impl Iterator<Item = NodeType> {
        NodeType::ALL
            .into_iter()
            .filter(move |t| self.contains(t.flag()))
    }
}

/// Errors from parsing inbound packets.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("packet truncated at byte {0}")]
    Truncated(usize),
    #[error("unexpected packet type {0:#04x}")]
    UnexpectedType(u8),
    #[error("unknown node type {0:#04x}")]
    UnknownNodeType(u8),
    #[error("varint overflows u32")]
    VarintOverflow,
}

/// Appends `value` as an unsigned LEB128 varint.
pub fn put_varint(buf: &mut impl BufMut, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

/// Encoded length of `value` as a varint.
pub fn varint_len(value: u32) -> usize {
    match value {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0xfff_ffff => 4,
        _ => 5,
    }
}

/// Reads a varint from the front of `data`, returning the value and the
/// number of bytes consumed.
pub fn get_varint(data: &[u8]) -> Result<(u32, usize), DecodeError> {
    let mut value: u32 = 0;
    for (i, byte) in data.iter().enumerate().take(5) {
        let bits = (byte & 0x7f) as u32;
        if i == 4 && bits > 0x0f {
            return Err(DecodeError::VarintOverflow);
        }
        value |= bits << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    if data.len() >= 5 {
        Err(DecodeError::VarintOverflow)
    } else {
        Err(DecodeError::Truncated(data.len()))
    }
}

/// Process-wide send counters. Monotonic, never reset.
#[derive(Debug, Default)]
pub struct NetStats {
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl NetStats {
    pub fn record_packet(&self, len: usize) {
        self.packets_sent.fetch_add(1, Ordering::SeqCst);
        self.bytes_sent.fetch_add(len as u64, Ordering::SeqCst);
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::SeqCst)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::SeqCst)
    }
}

/// Datagram endpoint.
///
/// Sends are fire-and-forget; receives never block.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> anyhow::Result<()>;

    /// Returns `Ok(None)` immediately when nothing is queued.
    fn try_recv_from(&self, buf: &mut [u8]) -> anyhow::Result<Option<(usize, SocketAddr)>>;
}

/// Unreliable channel over UDP.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(addr).await.context("udp bind")?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> anyhow::Result<()> {
        self.socket
            .send_to(payload, target)
            .await
            .with_context(|| format!("udp send to {target}"))?;
        Ok(())
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> anyhow::Result<Option<(usize, SocketAddr)>> {
        match self.socket.try_recv_from(buf) {
            Ok((n, from)) => Ok(Some((n, from))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e).context("udp recv"),
        }
    }
}
