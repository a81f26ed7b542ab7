//! `voxbug_agent`
//!
//! The bug agent:
//! - Fixed-rate tick loop with adaptive sleep
//! - Motion along a line or an orbit
//! - Erase-then-redraw voxel edits broadcast to every voxel server
//! - Domain server heartbeat and one inbound packet per tick
//! - Occasional positional chirps
//!
//! Networking model: a single UDP socket, fire-and-forget sends, non-blocking
//! receives.

pub mod broadcast;
pub mod bug;
pub mod motion;
pub mod operative;

#[cfg(test)]
mod testing;

pub use operative::{bind, BugAgent, Collaborators};
