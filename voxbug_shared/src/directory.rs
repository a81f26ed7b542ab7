//! Node directory.
//!
//! The directory knows which nodes exist and what role each plays. The agent
//! only ever asks it for "all endpoints of type T", tells it to check in with
//! the domain server, and hands it inbound packets.
//!
//! Check-in packet:
//! ```text
//! [b'L'][owner type: u8][interest count: u8][interest types: u8...]
//! ```
//! Domain list packet (reply from the domain server):
//! ```text
//! [b'D'][count: varint][count x ([type: u8][ipv4: 4 bytes][port: u16])]
//! ```

use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::Arc,
};

use anyhow::Context;
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use tracing::{debug, info, trace};

use crate::net::{
    get_varint, put_varint, DecodeError, NodeType, NodeTypes, Transport,
    PACKET_TYPE_DOMAIN, PACKET_TYPE_DOMAIN_LIST_REQUEST, PACKET_TYPE_PING,
};

const NODE_WIRE_SIZE: usize = 1 + 4 + 2;

/// A known node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub node_type: NodeType,
    pub addr: SocketAddr,
}

/// Registry of reachable nodes.
#[async_trait]
pub trait NodeDirectory: Send + Sync {
    /// All endpoints currently registered under `node_type`.
    fn endpoints(&self, node_type: NodeType) -> Vec<SocketAddr>;

    /// Announces this process to the domain server.
    async fn check_in(&mut self) -> anyhow::Result<()>;

    fn set_owner_type(&mut self, owner: NodeType);

    fn set_types_of_interest(&mut self, types: NodeTypes);
}

/// Consumer of datagrams the agent did not send itself.
pub trait InboundProcessor: Send {
    fn process_node_data(&mut self, sender: SocketAddr, data: &[u8]);
}

/// UDP-backed node directory.
pub struct NodeList {
    transport: Arc<dyn Transport>,
    domain_server: Option<SocketAddr>,
    owner_type: NodeType,
    interest: NodeTypes,
    nodes: Vec<Node>,
}

impl NodeList {
    pub fn new(transport: Arc<dyn Transport>, domain_server: Option<SocketAddr>) -> Self {
        Self {
            transport,
            domain_server,
            owner_type: NodeType::Agent,
            interest: NodeTypes::empty(),
            nodes: Vec::new(),
        }
    }

    /// Registers a node directly, e.g. from static configuration.
    pub fn add_node(&mut self, node_type: NodeType, addr: SocketAddr) {
        let node = Node { node_type, addr };
        if !self.nodes.contains(&node) {
            self.nodes.push(node);
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn owner_type(&self) -> NodeType {
        self.owner_type
    }

    pub fn interest(&self) -> NodeTypes {
        self.interest
    }

    fn check_in_packet(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(3 + NodeType::ALL.len());
        buf.push(PACKET_TYPE_DOMAIN_LIST_REQUEST);
        buf.push(self.owner_type.as_byte());
        let types: Vec<u8> = self.interest.types().map(NodeType::as_byte).collect();
        buf.push(types.len() as u8);
        buf.extend_from_slice(&types);
        buf
    }

    /// Replaces the known node set with the domain server's view, keeping
    /// only the types this process is interested in.
    fn apply_domain_list(&mut self, nodes: Vec<Node>) {
        let before = self.nodes.len();
        let interest = self.interest;
        self.nodes = nodes
            .into_iter()
            .filter(|n| interest.contains(n.node_type.flag()))
            .collect();
        if self.nodes.len() != before {
            info!(before, after = self.nodes.len(), "Node list updated");
        }
    }
}

#[async_trait]
impl NodeDirectory for NodeList {
    fn endpoints(&self, node_type: NodeType) -> Vec<SocketAddr> {
        self.nodes
            .iter()
            .filter(|n| n.node_type == node_type)
            .map(|n| n.addr)
            .collect()
    }

    async fn check_in(&mut self) -> anyhow::Result<()> {
        let Some(domain) = self.domain_server else {
            trace!("No domain server configured, skipping check-in");
            return Ok(());
        };
        let packet = self.check_in_packet();
        self.transport
            .send_to(&packet, domain)
            .await
            .context("domain server check-in")?;
        trace!(%domain, "Checked in with domain server");
        Ok(())
    }

    fn set_owner_type(&mut self, owner: NodeType) {
        self.owner_type = owner;
    }

    fn set_types_of_interest(&mut self, types: NodeTypes) {
        self.interest = types;
    }
}

impl InboundProcessor for NodeList {
    fn process_node_data(&mut self, sender: SocketAddr, data: &[u8]) {
        match data.first().copied() {
            Some(PACKET_TYPE_DOMAIN) => match decode_domain_list(data) {
                Ok(nodes) => self.apply_domain_list(nodes),
                Err(e) => debug!(%sender, error = %e, "Malformed domain list"),
            },
            Some(PACKET_TYPE_PING) => trace!(%sender, "Ping"),
            Some(other) => debug!(%sender, packet_type = other, "Ignoring packet"),
            None => debug!(%sender, "Ignoring empty datagram"),
        }
    }
}

/// Encodes a domain list. Nodes with IPv6 addresses are skipped.
pub fn encode_domain_list(nodes: &[Node]) -> Vec<u8> {
    let v4: Vec<(NodeType, SocketAddrV4)> = nodes
        .iter()
        .filter_map(|n| match n.addr {
            SocketAddr::V4(a) => Some((n.node_type, a)),
            SocketAddr::V6(_) => None,
        })
        .collect();

    let mut buf = BytesMut::with_capacity(1 + 5 + v4.len() * NODE_WIRE_SIZE);
    buf.put_u8(PACKET_TYPE_DOMAIN);
    put_varint(&mut buf, v4.len() as u32);
    for (node_type, addr) in v4 {
        buf.put_u8(node_type.as_byte());
        buf.put_slice(&addr.ip().octets());
        buf.put_u16_le(addr.port());
    }
    buf.to_vec()
}

pub fn decode_domain_list(data: &[u8]) -> Result<Vec<Node>, DecodeError> {
    let (&kind, rest) = data.split_first().ok_or(DecodeError::Truncated(0))?;
    if kind != PACKET_TYPE_DOMAIN {
        return Err(DecodeError::UnexpectedType(kind));
    }
    let (count, used) = get_varint(rest)?;
    let mut offset = 1 + used;
    let mut nodes = Vec::with_capacity((count as usize).min(data.len() / NODE_WIRE_SIZE));
    for _ in 0..count {
        let entry = data
            .get(offset..offset + NODE_WIRE_SIZE)
            .ok_or(DecodeError::Truncated(data.len()))?;
        let node_type = NodeType::from_byte(entry[0]).ok_or(DecodeError::UnknownNodeType(entry[0]))?;
        let ip = Ipv4Addr::new(entry[1], entry[2], entry[3], entry[4]);
        let port = u16::from_le_bytes([entry[5], entry[6]]);
        nodes.push(Node {
            node_type,
            addr: SocketAddr::V4(SocketAddrV4::new(ip, port)),
        });
        offset += NODE_WIRE_SIZE;
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_to(&self, payload: &[u8], target: SocketAddr) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push((payload.to_vec(), target));
            Ok(())
        }

        fn try_recv_from(&self, _buf: &mut [u8]) -> anyhow::Result<Option<(usize, SocketAddr)>> {
            Ok(None)
        }
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn agent_list(domain: Option<SocketAddr>) -> (Arc<RecordingTransport>, NodeList) {
        let transport = Arc::new(RecordingTransport::default());
        let mut list = NodeList::new(transport.clone(), domain);
        list.set_owner_type(NodeType::Agent);
        list.set_types_of_interest(NodeTypes::VOXEL_SERVER | NodeTypes::AUDIO_MIXER);
        (transport, list)
    }

    #[tokio::test]
    async fn check_in_announces_owner_and_interest() {
        let domain = addr("10.0.0.1:40102");
        let (transport, mut list) = agent_list(Some(domain));
        list.check_in().await.unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, domain);
        assert_eq!(sent[0].0, vec![b'L', b'I', 2, b'V', b'M']);
    }

    #[tokio::test]
    async fn check_in_without_domain_is_a_no_op() {
        let (transport, mut list) = agent_list(None);
        list.check_in().await.unwrap();
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn domain_list_replaces_nodes_of_interest() {
        let (_transport, mut list) = agent_list(None);
        list.add_node(NodeType::VoxelServer, addr("127.0.0.1:1"));

        let reply = encode_domain_list(&[
            Node {
                node_type: NodeType::VoxelServer,
                addr: addr("10.0.0.2:40106"),
            },
            Node {
                node_type: NodeType::AvatarMixer,
                addr: addr("10.0.0.3:40107"),
            },
            Node {
                node_type: NodeType::AudioMixer,
                addr: addr("10.0.0.4:40108"),
            },
        ]);
        list.process_node_data(addr("10.0.0.1:40102"), &reply);

        assert_eq!(list.endpoints(NodeType::VoxelServer), vec![addr("10.0.0.2:40106")]);
        assert_eq!(list.endpoints(NodeType::AudioMixer), vec![addr("10.0.0.4:40108")]);
        assert!(list.endpoints(NodeType::AvatarMixer).is_empty());
    }

    #[test]
    fn malformed_packets_leave_nodes_alone() {
        let (_transport, mut list) = agent_list(None);
        list.add_node(NodeType::VoxelServer, addr("127.0.0.1:1"));

        list.process_node_data(addr("10.0.0.1:1"), &[PACKET_TYPE_DOMAIN, 3, b'V']);
        list.process_node_data(addr("10.0.0.1:1"), &[]);
        list.process_node_data(addr("10.0.0.1:1"), b"Pping");

        assert_eq!(list.endpoints(NodeType::VoxelServer), vec![addr("127.0.0.1:1")]);
    }

    #[test]
    fn add_node_ignores_duplicates() {
        let (_transport, mut list) = agent_list(None);
        list.add_node(NodeType::VoxelServer, addr("127.0.0.1:1"));
        list.add_node(NodeType::VoxelServer, addr("127.0.0.1:1"));
        assert_eq!(list.nodes().len(), 1);
    }

    #[test]
    fn decode_rejects_unknown_node_type() {
        let mut bytes = encode_domain_list(&[Node {
            node_type: NodeType::VoxelServer,
            addr: addr("1.2.3.4:5"),
        }]);
        bytes[2] = b'?';
        assert_eq!(decode_domain_list(&bytes), Err(DecodeError::UnknownNodeType(b'?')));
    }
}
