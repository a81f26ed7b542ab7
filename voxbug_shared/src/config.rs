//! Configuration system.
//!
//! Loads agent configuration from JSON strings (file IO left to the binary).
//! Every field has a default so a partial JSON document is enough.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// How the bug moves through the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MotionMode {
    /// Straight line, bouncing along z between two bounds.
    Linear,
    /// Circular orbit around a fixed center.
    #[default]
    Orbital,
}

impl std::str::FromStr for MotionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(MotionMode::Linear),
            "orbital" => Ok(MotionMode::Orbital),
            other => anyhow::bail!("unknown motion mode {other:?} (expected linear|orbital)"),
        }
    }
}

/// Root configuration for the agent process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Local UDP bind address, e.g. `0.0.0.0:0`.
    pub bind_addr: String,
    /// Domain (directory) server the agent checks in with.
    pub domain_server: Option<String>,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// Interval between domain server check-ins, in milliseconds.
    pub heartbeat_ms: u64,
    /// Motion path of the bug.
    pub motion: MotionMode,
    /// Voxel servers known before the first domain list arrives.
    pub voxel_servers: Vec<String>,
    /// Audio mixers known before the first domain list arrives.
    pub audio_mixers: Vec<String>,
    /// Whether the bug may start chirping.
    pub audio_enabled: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:0".to_string(),
            domain_server: None,
            tick_hz: 60,
            heartbeat_ms: 1000,
            motion: MotionMode::default(),
            voxel_servers: Vec::new(),
            audio_mixers: Vec::new(),
            audio_enabled: true,
        }
    }
}

impl AgentConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Fixed tick period derived from `tick_hz`.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz.max(1) as f64)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn bind_socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.bind_addr.parse().context("parse bind_addr")
    }

    pub fn domain_socket_addr(&self) -> anyhow::Result<Option<SocketAddr>> {
        self.domain_server
            .as_deref()
            .map(|s| s.parse().context("parse domain_server"))
            .transpose()
    }

    pub fn voxel_server_addrs(&self) -> anyhow::Result<Vec<SocketAddr>> {
        parse_addrs(&self.voxel_servers, "voxel_servers")
    }

    pub fn audio_mixer_addrs(&self) -> anyhow::Result<Vec<SocketAddr>> {
        parse_addrs(&self.audio_mixers, "audio_mixers")
    }
}

fn parse_addrs(list: &[String], field: &str) -> anyhow::Result<Vec<SocketAddr>> {
    list.iter()
        .map(|s| {
            s.parse::<SocketAddr>()
                .with_context(|| format!("parse {field} entry {s:?}"))
        })
        .collect()
}
