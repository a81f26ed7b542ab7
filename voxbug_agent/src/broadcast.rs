//! Broadcast of edit messages to every node of a type.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;
use voxbug_shared::{
    directory::NodeDirectory,
    net::{NetStats, NodeType, Transport},
};

/// Fans a datagram out to all nodes of a type and keeps the send counters.
pub struct Broadcaster {
    transport: Arc<dyn Transport>,
    stats: Arc<NetStats>,
}

impl Broadcaster {
    pub fn new(transport: Arc<dyn Transport>, stats: Arc<NetStats>) -> Self {
        Self { transport, stats }
    }

    pub fn stats(&self) -> &Arc<NetStats> {
        &self.stats
    }

    /// Sends `payload` to every `node_type` endpoint in `directory`.
    ///
    /// Returns true if at least one endpoint took the datagram, in which case
    /// the counters grow by one packet and `payload.len()` bytes. No retries.
    pub async fn broadcast<D>(&self, directory: &D, payload: Bytes, node_type: NodeType) -> bool
    where
        D: NodeDirectory + ?Sized,
    {
        let endpoints = directory.endpoints(node_type);
        if endpoints.is_empty() {
            debug!(?node_type, "No endpoints to broadcast to");
            return false;
        }

        let mut delivered = 0usize;
        for endpoint in &endpoints {
            match self.transport.send_to(&payload, *endpoint).await {
                Ok(()) => delivered += 1,
                Err(e) => debug!(%endpoint, error = %e, "Broadcast send failed"),
            }
        }

        if delivered == 0 {
            return false;
        }
        self.stats.record_packet(payload.len());
        true
    }
}
