//! # Guild Jukebox
//!
//! Per-guild music queues for Discord: one playback state machine per
//! server, fed by slash commands and driven by songbird voice streams.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
