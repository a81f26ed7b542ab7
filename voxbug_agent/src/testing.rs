//! In-memory collaborators for agent tests.

use std::{
    collections::{HashSet, VecDeque},
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use voxbug_shared::{
    audio::AudioInjector,
    directory::{InboundProcessor, NodeDirectory},
    edit::{decode_edit_message, EditMessage},
    math::Vec3,
    net::{NodeType, NodeTypes, Transport},
};

pub fn addr(n: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40_000 + n))
}

#[derive(Default)]
struct TransportState {
    sent: Vec<(Vec<u8>, SocketAddr)>,
    failing: HashSet<SocketAddr>,
    fail_all: bool,
    inbound: VecDeque<(Vec<u8>, SocketAddr)>,
    delay: Duration,
}

/// Records every datagram; can be told to fail or to be slow.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<TransportState>,
}

impl MockTransport {
    pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Decoded edit messages in send order, one per datagram.
    pub fn edits(&self) -> Vec<EditMessage> {
        self.sent()
            .iter()
            .filter_map(|(bytes, _)| decode_edit_message(bytes).ok())
            .collect()
    }

    pub fn fail_target(&self, target: SocketAddr) {
        self.state.lock().unwrap().failing.insert(target);
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.state.lock().unwrap().fail_all = fail;
    }

    pub fn push_inbound(&self, from: SocketAddr, bytes: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .inbound
            .push_back((bytes.to_vec(), from));
    }

    pub fn inbound_pending(&self) -> usize {
        self.state.lock().unwrap().inbound.len()
    }

    /// Every send takes this long before completing.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> anyhow::Result<()> {
        let delay = self.state.lock().unwrap().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_all || state.failing.contains(&target) {
            anyhow::bail!("send to {target} refused");
        }
        state.sent.push((payload.to_vec(), target));
        Ok(())
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> anyhow::Result<Option<(usize, SocketAddr)>> {
        let Some((bytes, from)) = self.state.lock().unwrap().inbound.pop_front() else {
            return Ok(None);
        };
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(Some((n, from)))
    }
}

#[derive(Default)]
struct DirectoryState {
    nodes: Vec<(NodeType, SocketAddr)>,
    check_ins: usize,
    fail_check_in: bool,
    inbound: Vec<(SocketAddr, Vec<u8>)>,
    owner: Option<NodeType>,
    interest: NodeTypes,
}

/// Directory with a fixed node set that remembers what it was asked to do.
#[derive(Clone, Default)]
pub struct MockDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl MockDirectory {
    pub fn with_voxel_servers(servers: &[SocketAddr]) -> Self {
        let directory = Self::default();
        for s in servers {
            directory.add(NodeType::VoxelServer, *s);
        }
        directory
    }

    pub fn add(&self, node_type: NodeType, addr: SocketAddr) {
        self.state.lock().unwrap().nodes.push((node_type, addr));
    }

    pub fn clear(&self) {
        self.state.lock().unwrap().nodes.clear();
    }

    pub fn check_ins(&self) -> usize {
        self.state.lock().unwrap().check_ins
    }

    pub fn set_fail_check_in(&self, fail: bool) {
        self.state.lock().unwrap().fail_check_in = fail;
    }

    pub fn inbound(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        self.state.lock().unwrap().inbound.clone()
    }

    pub fn owner(&self) -> Option<NodeType> {
        self.state.lock().unwrap().owner
    }

    pub fn interest(&self) -> NodeTypes {
        self.state.lock().unwrap().interest
    }
}

#[async_trait]
impl NodeDirectory for MockDirectory {
    fn endpoints(&self, node_type: NodeType) -> Vec<SocketAddr> {
        self.state
            .lock()
            .unwrap()
            .nodes
            .iter()
            .filter(|(t, _)| *t == node_type)
            .map(|(_, a)| *a)
            .collect()
    }

    async fn check_in(&mut self) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check_ins += 1;
        if state.fail_check_in {
            anyhow::bail!("domain server unreachable");
        }
        Ok(())
    }

    fn set_owner_type(&mut self, owner: NodeType) {
        self.state.lock().unwrap().owner = Some(owner);
    }

    fn set_types_of_interest(&mut self, types: NodeTypes) {
        self.state.lock().unwrap().interest = types;
    }
}

impl InboundProcessor for MockDirectory {
    fn process_node_data(&mut self, sender: SocketAddr, data: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .inbound
            .push((sender, data.to_vec()));
    }
}

#[derive(Default)]
struct AudioState {
    streaming: bool,
    fail_start: bool,
    starts: Vec<Vec<SocketAddr>>,
    positions: Vec<Vec3>,
}

/// Audio injector that never plays anything.
#[derive(Clone, Default)]
pub struct MockAudio {
    state: Arc<Mutex<AudioState>>,
}

impl MockAudio {
    pub fn set_streaming(&self, streaming: bool) {
        self.state.lock().unwrap().streaming = streaming;
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.state.lock().unwrap().fail_start = fail;
    }

    pub fn starts(&self) -> Vec<Vec<SocketAddr>> {
        self.state.lock().unwrap().starts.clone()
    }

    pub fn positions(&self) -> Vec<Vec3> {
        self.state.lock().unwrap().positions.clone()
    }
}

impl AudioInjector for MockAudio {
    fn is_streaming(&self) -> bool {
        self.state.lock().unwrap().streaming
    }

    fn set_position(&mut self, position: Vec3) {
        self.state.lock().unwrap().positions.push(position);
    }

    fn start_stream(&mut self, mixers: Vec<SocketAddr>) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.starts.push(mixers);
        if state.fail_start {
            anyhow::bail!("injector unavailable");
        }
        Ok(())
    }
}
