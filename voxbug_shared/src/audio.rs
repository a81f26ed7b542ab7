//! Positional audio injection.
//!
//! An injector streams a short clip to the audio mixers as a detached task.
//! Callers only ever ask whether a stream is active and request new ones;
//! they never hold a handle to the running stream.
//!
//! Audio packet:
//! ```text
//! [b'I'][stream id: u32][x: f32][y: f32][z: f32][samples: i16...]
//! ```

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::{BufMut, BytesMut};
use tracing::{debug, info};

use crate::{
    math::Vec3,
    net::{Transport, PACKET_TYPE_INJECT_AUDIO},
};

pub const SAMPLE_RATE: u32 = 22_050;
pub const SAMPLES_PER_FRAME: usize = 256;

/// Time covered by one audio frame.
pub fn frame_duration() -> Duration {
    Duration::from_secs_f64(SAMPLES_PER_FRAME as f64 / SAMPLE_RATE as f64)
}

/// Source of positional audio streams.
pub trait AudioInjector: Send + Sync {
    fn is_streaming(&self) -> bool;

    fn set_position(&mut self, position: Vec3);

    /// Starts streaming to `mixers` from the current position and returns
    /// without waiting for the stream.
    fn start_stream(&mut self, mixers: Vec<SocketAddr>) -> anyhow::Result<()>;
}

/// Injector that plays one fixed clip.
pub struct ClipInjector {
    transport: Arc<dyn Transport>,
    samples: Arc<[i16]>,
    position: Vec3,
    streaming: Arc<AtomicBool>,
    next_stream_id: u32,
}

impl ClipInjector {
    pub fn new(transport: Arc<dyn Transport>, samples: Vec<i16>) -> Self {
        Self {
            transport,
            samples: samples.into(),
            position: Vec3::ZERO,
            streaming: Arc::new(AtomicBool::new(false)),
            next_stream_id: 1,
        }
    }

    /// Injector playing the bug's chirp.
    pub fn chirp(transport: Arc<dyn Transport>) -> Self {
        Self::new(transport, chirp_samples())
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }
}

impl AudioInjector for ClipInjector {
    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    fn start_stream(&mut self, mixers: Vec<SocketAddr>) -> anyhow::Result<()> {
        if mixers.is_empty() {
            anyhow::bail!("no audio mixers to stream to");
        }
        if self.samples.is_empty() {
            anyhow::bail!("clip has no samples");
        }
        if self.streaming.swap(true, Ordering::SeqCst) {
            anyhow::bail!("already streaming");
        }

        let stream_id = self.next_stream_id;
        self.next_stream_id = self.next_stream_id.wrapping_add(1);
        let position = self.position;
        let samples = self.samples.clone();
        let transport = self.transport.clone();
        let guard = StreamingGuard(self.streaming.clone());

        info!(stream_id, mixers = mixers.len(), ?position, "Starting audio stream");
        tokio::spawn(async move {
            let _guard = guard;
            let mut interval = tokio::time::interval(frame_duration());
            for frame in samples.chunks(SAMPLES_PER_FRAME) {
                interval.tick().await;
                let packet = encode_audio_frame(stream_id, position, frame);
                for mixer in &mixers {
                    if let Err(e) = transport.send_to(&packet, *mixer).await {
                        debug!(stream_id, %mixer, error = %e, "Audio frame not sent");
                    }
                }
            }
            debug!(stream_id, "Audio stream finished");
        });
        Ok(())
    }
}

/// Clears the streaming flag when the stream task ends, however it ends.
struct StreamingGuard(Arc<AtomicBool>);

impl Drop for StreamingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub fn encode_audio_frame(stream_id: u32, position: Vec3, samples: &[i16]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(1 + 4 + 12 + samples.len() * 2);
    buf.put_u8(PACKET_TYPE_INJECT_AUDIO);
    buf.put_u32_le(stream_id);
    buf.put_f32_le(position.x);
    buf.put_f32_le(position.y);
    buf.put_f32_le(position.z);
    for s in samples {
        buf.put_i16_le(*s);
    }
    buf.to_vec()
}

/// Half a second of rising sweep with a soft attack and release.
pub fn chirp_samples() -> Vec<i16> {
    const SECONDS: f32 = 0.5;
    const START_HZ: f32 = 1800.0;
    const END_HZ: f32 = 4200.0;

    let rate = SAMPLE_RATE as f32;
    let total = (rate * SECONDS) as usize;
    let mut phase = 0.0f32;
    (0..total)
        .map(|i| {
            let t = i as f32 / total as f32;
            let freq = START_HZ + (END_HZ - START_HZ) * t;
            phase = (phase + std::f32::consts::TAU * freq / rate) % std::f32::consts::TAU;
            let envelope = (t * 10.0).min(1.0) * ((1.0 - t) * 10.0).min(1.0);
            (phase.sin() * envelope * i16::MAX as f32 * 0.6) as i16
        })
        .collect()
}
