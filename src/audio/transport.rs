//! Collaborator seams of the playback engine.
//!
//! The engine owns the voice connection of each guild through a
//! [`Transport`]; nothing else issues start/stop calls on it. Display goes
//! out through a [`PresentationSink`], which must not block the engine.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::{
    audio::{now_playing::NowPlayingSnapshot, queue::QueueSnapshot},
    error::MusicError,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("conexión de voz fallida: {0}")]
    Connect(String),
    #[error("no se pudo iniciar el stream: {0}")]
    Stream(String),
}

/// End-of-stream notification for one streaming attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub guild_id: GuildId,
    pub generation: u64,
    /// `None` for a clean end (natural or requested stop).
    pub error: Option<String>,
}

/// Single-use handle a transport fires when a stream ends.
///
/// `notify` consumes it, so an attempt produces at most one completion.
/// Dropping it without notifying means the attempt never started.
#[derive(Debug)]
pub struct CompletionNotifier {
    guild_id: GuildId,
    generation: u64,
    sender: UnboundedSender<Completion>,
}

impl CompletionNotifier {
    pub(crate) fn new(guild_id: GuildId, generation: u64, sender: UnboundedSender<Completion>) -> Self {
        Self {
            guild_id,
            generation,
            sender,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notify(self, error: Option<String>) {
        let completion = Completion {
            guild_id: self.guild_id,
            generation: self.generation,
            error,
        };
        if self.sender.send(completion).is_err() {
            // El engine ya soltó el buzón de la guild (teardown)
            debug!(
                "📭 Notificación descartada para guild {} (generación {})",
                self.guild_id, self.generation
            );
        }
    }
}

/// Voice connection and audio streaming for guilds.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), TransportError>;

    /// Starts streaming `locator`. On `Ok`, the transport must later fire
    /// `notifier` exactly once; on `Err` it must drop it unfired.
    async fn start_stream(
        &self,
        guild_id: GuildId,
        locator: &str,
        notifier: CompletionNotifier,
    ) -> Result<(), TransportError>;

    /// Requests the current stream to end; its completion still fires.
    async fn stop_stream(&self, guild_id: GuildId);

    async fn is_streaming(&self, guild_id: GuildId) -> bool;

    async fn is_connected(&self, guild_id: GuildId) -> bool;

    async fn disconnect(&self, guild_id: GuildId);
}

/// Receives what the engine wants shown to users.
///
/// Calls happen on engine tasks; implementations hand off any slow work
/// (HTTP, message edits) instead of awaiting it inline.
pub trait PresentationSink: Send + Sync {
    /// A track started. `channel` is the auto-display channel, if enabled.
    fn now_playing(&self, guild_id: GuildId, channel: Option<ChannelId>, snapshot: &NowPlayingSnapshot);

    /// The engine changed the queue on its own (repeat requeue, drained queue).
    fn queue_snapshot(&self, guild_id: GuildId, channel: Option<ChannelId>, snapshot: &QueueSnapshot);

    fn error(&self, guild_id: GuildId, channel: Option<ChannelId>, error: &MusicError);
}
