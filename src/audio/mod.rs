//! # Audio Module
//!
//! Per-guild playback for the bot: queue state, the playback state machine
//! and the voice transport.
//!
//! ## Architecture
//!
//! ### [`store`] - Guild State
//! - One [`queue::GuildPlaybackState`] per guild, created lazily
//! - Guilds never share a lock
//!
//! ### [`engine`] - Playback Engine
//! - `Idle → Starting → Streaming → Idle` per guild
//! - Generation tags discard completions of superseded streams
//! - Repeat decisions through [`repeat::RepeatPolicy`]
//!
//! ### [`voice`] - Songbird Transport
//! - Voice connections and yt-dlp streams via songbird
//! - Reports every stream end back to the engine exactly once
//!
//! ### [`now_playing`] - Live Progress
//! - Elapsed/total snapshots and per-track update streams

pub mod engine;
pub mod now_playing;
pub mod queue;
pub mod repeat;
pub mod store;
pub mod track;
pub mod transport;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{EngineOptions, PlaybackEngine};
pub use store::GuildQueueStore;
pub use track::TrackRef;
