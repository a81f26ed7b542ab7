//! Agent loop.
//!
//! One tick, in order:
//! 1. erase the voxels drawn last tick
//! 2. advance the bug and project its new voxels
//! 3. draw them (destructive set)
//! 4. move the audio source to the bug's head, maybe start a chirp
//! 5. check in with the domain server when the heartbeat is due
//! 6. drain at most one inbound datagram
//! 7. sleep off whatever is left of the tick period
//!
//! The loop is single-task and cooperative. Nothing that fails inside a tick
//! stops the agent; only the shutdown flag does.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use voxbug_shared::{
    audio::{AudioInjector, ClipInjector},
    config::AgentConfig,
    directory::{InboundProcessor, NodeDirectory, NodeList},
    edit::{build_edit_message, EditOpcode, VoxelDescriptor},
    math::Vec3,
    net::{NetStats, NodeType, NodeTypes, Transport, UdpTransport, MAX_PACKET_SIZE},
};

use crate::{
    broadcast::Broadcaster,
    bug::{project, voice_point, BUG_PARTS},
    motion::{MotionModel, Pose},
};

/// A chirp may start when a roll in `1..=AUDIO_TRIGGER_SIDES` lands on this.
pub const AUDIO_TRIGGER_ROLL: u32 = 99;
pub const AUDIO_TRIGGER_SIDES: u32 = 100;

/// Directory the agent talks to: node lookups plus inbound packet handling.
pub trait AgentDirectory: NodeDirectory + InboundProcessor {}

impl<T: NodeDirectory + InboundProcessor> AgentDirectory for T {}

/// Lifecycle of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Running,
    /// Shutdown observed; the final erase is being sent.
    Stopping,
    Terminated,
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub erased: bool,
    pub drawn: bool,
    pub audio_started: bool,
    pub checked_in: bool,
    pub inbound: bool,
    pub slept: Duration,
    pub overrun: bool,
}

/// Everything the agent talks to, injected at construction.
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub directory: Box<dyn AgentDirectory>,
    pub audio: Option<Box<dyn AudioInjector>>,
}

/// Time left in the tick, or `None` when the tick ran over.
pub fn sleep_budget(period: Duration, elapsed: Duration) -> Option<Duration> {
    period.checked_sub(elapsed).filter(|left| !left.is_zero())
}

/// One fair roll of the chirp die.
pub fn roll_audio_trigger(rng: &mut impl Rng) -> bool {
    rng.gen_range(1..=AUDIO_TRIGGER_SIDES) == AUDIO_TRIGGER_ROLL
}

/// The bug agent.
pub struct BugAgent {
    tick_period: Duration,
    heartbeat_interval: Duration,
    motion: MotionModel,
    transport: Arc<dyn Transport>,
    directory: Box<dyn AgentDirectory>,
    audio: Option<Box<dyn AudioInjector>>,
    broadcaster: Broadcaster,
    /// Voxels currently drawn in the world; erased at the start of each tick.
    last_drawn: Vec<VoxelDescriptor>,
    last_check_in: Option<Instant>,
    shutdown: Arc<AtomicBool>,
    state: AgentState,
    tick: u64,
    rng: StdRng,
    recv_buf: Vec<u8>,
}

impl BugAgent {
    pub fn new(cfg: &AgentConfig, parts: Collaborators) -> Self {
        let Collaborators {
            transport,
            mut directory,
            audio,
        } = parts;

        directory.set_owner_type(NodeType::Agent);
        directory.set_types_of_interest(NodeTypes::VOXEL_SERVER | NodeTypes::AUDIO_MIXER);

        let motion = MotionModel::new(cfg.motion);
        let last_drawn = project(motion.pose(), &BUG_PARTS);
        let stats = Arc::new(NetStats::default());

        Self {
            tick_period: cfg.tick_period(),
            heartbeat_interval: cfg.heartbeat_interval(),
            motion,
            broadcaster: Broadcaster::new(transport.clone(), stats),
            transport,
            directory,
            audio,
            last_drawn,
            last_check_in: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            state: AgentState::Running,
            tick: 0,
            rng: StdRng::from_entropy(),
            recv_buf: vec![0u8; MAX_PACKET_SIZE],
        }
    }

    /// Makes the chirp trigger reproducible.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Flag that stops the loop at the next tick boundary once set.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> Arc<NetStats> {
        self.broadcaster.stats().clone()
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn pose(&self) -> &Pose {
        self.motion.pose()
    }

    pub fn last_drawn(&self) -> &[VoxelDescriptor] {
        &self.last_drawn
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Runs ticks until shutdown is requested, then erases the bug.
    pub async fn run(&mut self) {
        info!(
            period_us = self.tick_period.as_micros() as u64,
            mode = ?self.motion.pose().mode,
            "Agent running"
        );
        while self.state == AgentState::Running {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            self.step().await;
        }
        self.stop().await;
    }

    /// Runs exactly `ticks` ticks, ignoring the shutdown flag.
    pub async fn run_for_ticks(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.step().await;
        }
    }

    /// One paced tick: the tick's work followed by the sleep that keeps the
    /// tick rate.
    pub async fn step(&mut self) -> TickReport {
        let started = Instant::now();
        let mut report = self.tick().await;

        match sleep_budget(self.tick_period, started.elapsed()) {
            Some(left) => {
                tokio::time::sleep(left).await;
                report.slept = left;
            }
            None => {
                warn!(
                    tick = self.tick,
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "Last tick took too long, not sleeping"
                );
                report.overrun = true;
            }
        }
        report
    }

    /// The tick's work, without pacing.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        self.tick += 1;

        report.erased = self.send_edit(EditOpcode::Erase, &self.last_drawn).await;

        let pose = self.motion.advance();
        let fresh = project(&pose, &BUG_PARTS);
        report.drawn = self.send_edit(EditOpcode::SetDestructive, &fresh).await;

        if let Some(voice) = voice_point(&fresh) {
            report.audio_started = self.update_audio(voice);
        }
        if report.drawn {
            self.last_drawn = fresh;
        }

        report.checked_in = self.heartbeat().await;
        report.inbound = self.poll_inbound();

        trace!(
            tick = self.tick,
            erased = report.erased,
            drawn = report.drawn,
            x = pose.position.x,
            y = pose.position.y,
            z = pose.position.z,
            "Tick"
        );
        report
    }

    /// Sends the final erase and terminates. Idempotent.
    pub async fn stop(&mut self) {
        if self.state == AgentState::Terminated {
            return;
        }
        self.state = AgentState::Stopping;
        info!("Removing the bug and stopping");

        let erased = self.send_edit(EditOpcode::Erase, &self.last_drawn).await;
        if !erased {
            warn!("Final erase could not be sent");
        }

        self.state = AgentState::Terminated;
        let stats = self.broadcaster.stats();
        info!(
            ticks = self.tick,
            packets_sent = stats.packets_sent(),
            bytes_sent = stats.bytes_sent(),
            "Agent stopped"
        );
    }

    async fn send_edit(&self, opcode: EditOpcode, voxels: &[VoxelDescriptor]) -> bool {
        let payload = match build_edit_message(opcode, voxels) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(?opcode, error = %e, "Edit message not built");
                return false;
            }
        };
        self.broadcaster
            .broadcast(self.directory.as_ref(), payload, NodeType::VoxelServer)
            .await
    }

    fn update_audio(&mut self, voice: Vec3) -> bool {
        let Some(audio) = self.audio.as_mut() else {
            return false;
        };
        audio.set_position(voice);

        if audio.is_streaming() || !roll_audio_trigger(&mut self.rng) {
            return false;
        }
        let mixers: Vec<SocketAddr> = self.directory.endpoints(NodeType::AudioMixer);
        match audio.start_stream(mixers) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Audio stream not started");
                false
            }
        }
    }

    async fn heartbeat(&mut self) -> bool {
        let due = self
            .last_check_in
            .map_or(true, |at| at.elapsed() >= self.heartbeat_interval);
        if !due {
            return false;
        }
        self.last_check_in = Some(Instant::now());
        if let Err(e) = self.directory.check_in().await {
            debug!(error = %e, "Check-in failed");
        }
        true
    }

    fn poll_inbound(&mut self) -> bool {
        match self.transport.try_recv_from(&mut self.recv_buf) {
            Ok(Some((n, from))) => {
                self.directory.process_node_data(from, &self.recv_buf[..n]);
                true
            }
            Ok(None) => false,
            Err(e) => {
                debug!(error = %e, "Inbound poll failed");
                false
            }
        }
    }
}

/// Binds the agent's UDP socket and wires it to a `NodeList` seeded from
/// `cfg`. Returns the agent and its local address.
pub async fn bind(cfg: &AgentConfig) -> anyhow::Result<(BugAgent, SocketAddr)> {
    let udp = Arc::new(UdpTransport::bind(cfg.bind_socket_addr()?).await?);
    let local = udp.local_addr()?;
    let transport: Arc<dyn Transport> = udp;

    let mut nodes = NodeList::new(transport.clone(), cfg.domain_socket_addr()?);
    for addr in cfg.voxel_server_addrs()? {
        nodes.add_node(NodeType::VoxelServer, addr);
    }
    for addr in cfg.audio_mixer_addrs()? {
        nodes.add_node(NodeType::AudioMixer, addr);
    }

    let audio: Option<Box<dyn AudioInjector>> = if cfg.audio_enabled {
        Some(Box::new(ClipInjector::chirp(transport.clone())))
    } else {
        None
    };

    let agent = BugAgent::new(
        cfg,
        Collaborators {
            transport,
            directory: Box::new(nodes),
            audio,
        },
    );
    Ok((agent, local))
}
