//! Debug voxel server and domain server stand-in.
//!
//! Usage:
//!   cargo run -p voxbug_tests --bin voxel_sink -- [127.0.0.1:40106]
//!
//! Logs every edit message and audio frame it receives. Check-ins are answered
//! with a domain list naming the sink as the only voxel server, so an agent
//! started with `--domain <sink addr>` finds it without static config.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};
use voxbug_shared::{
    directory::{encode_domain_list, Node},
    edit::decode_edit_message,
    net::{
        NodeType, MAX_PACKET_SIZE, PACKET_TYPE_DOMAIN_LIST_REQUEST, PACKET_TYPE_ERASE_VOXEL,
        PACKET_TYPE_INJECT_AUDIO, PACKET_TYPE_SET_VOXEL_DESTRUCTIVE,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:40106".to_string())
        .parse()
        .context("parse listen address")?;
    let socket = UdpSocket::bind(addr).await.context("udp bind")?;
    let local = socket.local_addr()?;
    info!(%local, "Voxel sink listening");

    let domain_reply = encode_domain_list(&[Node {
        node_type: NodeType::VoxelServer,
        addr: local,
    }]);

    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let (mut edits, mut audio_frames) = (0u64, 0u64);
    loop {
        let (n, from) = socket.recv_from(&mut buf).await.context("udp recv")?;
        let packet = &buf[..n];
        match packet.first().copied() {
            Some(PACKET_TYPE_ERASE_VOXEL | PACKET_TYPE_SET_VOXEL_DESTRUCTIVE) => {
                match decode_edit_message(packet) {
                    Ok(msg) => {
                        edits += 1;
                        let first = msg.descriptors.first().map(|d| d.position);
                        info!(%from, edits, opcode = ?msg.opcode, voxels = msg.descriptors.len(), ?first, "Edit");
                    }
                    Err(e) => warn!(%from, error = %e, "Bad edit message"),
                }
            }
            Some(PACKET_TYPE_DOMAIN_LIST_REQUEST) => {
                debug!(%from, "Check-in");
                socket.send_to(&domain_reply, from).await.context("domain reply")?;
            }
            Some(PACKET_TYPE_INJECT_AUDIO) => {
                audio_frames += 1;
                if audio_frames % 50 == 1 {
                    info!(%from, audio_frames, bytes = n, "Audio");
                }
            }
            other => debug!(%from, packet_type = ?other, bytes = n, "Ignored"),
        }
    }
}
