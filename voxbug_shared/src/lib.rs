//! `voxbug_shared`
//!
//! Libraries the agent is built from, kept apart from the loop itself.
//!
//! Design goals:
//! - Deterministic where practical.
//! - Explicit little-endian wire formats.
//! - Traits at the network seams for dependency injection.
//! - No `unsafe`.

pub mod audio;
pub mod config;
pub mod directory;
pub mod edit;
pub mod math;
pub mod net;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::audio::*;
    pub use crate::config::*;
    pub use crate::directory::*;
    pub use crate::edit::*;
    pub use crate::math::*;
    pub use crate::net::*;
}
