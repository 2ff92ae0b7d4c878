use futures::{future, Stream, StreamExt};
use serenity::{
    builder::{CreateEmbed, CreateMessage, EditMessage},
    http::Http,
    model::id::{ChannelId, GuildId, MessageId},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    audio::{
        now_playing::{NowPlayingSnapshot, NowPlayingTracker},
        queue::{QueueSnapshot, RepeatMode},
        store::GuildQueueStore,
        transport::PresentationSink,
    },
    error::MusicError,
    ui::embeds,
};

/// [`PresentationSink`] that posts to Discord text channels.
///
/// Every HTTP call runs on its own task; the engine never waits on Discord.
#[derive(Clone)]
pub struct DiscordPresenter {
    http: Arc<Http>,
    store: GuildQueueStore,
    tracker: NowPlayingTracker,
}

impl DiscordPresenter {
    pub fn new(http: Arc<Http>, store: GuildQueueStore, tracker: NowPlayingTracker) -> Self {
        Self { http, store, tracker }
    }

    pub fn repeat_mode(&self, guild_id: GuildId) -> RepeatMode {
        self.store
            .read(guild_id, |state| state.repeat_mode())
            .unwrap_or_default()
    }

    /// Refreshed now-playing embeds for the track with `generation`, one per
    /// tracker tick after the first.
    ///
    /// Ends when that track stops streaming.
    pub fn live_embeds(&self, guild_id: GuildId, generation: u64) -> impl Stream<Item = CreateEmbed> + Send + 'static {
        let this = self.clone();
        // El primer snapshot ya está publicado
        self.tracker
            .watch(guild_id)
            .take_while(move |snapshot| future::ready(snapshot.generation == generation))
            .skip(1)
            .map(move |snapshot| embeds::create_now_playing_embed(&snapshot, this.repeat_mode(guild_id)))
    }

    async fn follow_now_playing(&self, guild_id: GuildId, channel_id: ChannelId, message_id: MessageId, generation: u64) {
        let mut updates = Box::pin(self.live_embeds(guild_id, generation));

        while let Some(embed) = updates.next().await {
            if let Err(e) = channel_id
                .edit_message(&self.http, message_id, EditMessage::new().embed(embed))
                .await
            {
                debug!("✏️ Now playing ya no se puede editar en guild {}: {:?}", guild_id, e);
                return;
            }
        }
        debug!("⏹️ Actualizaciones de now playing terminadas en guild {}", guild_id);
    }

    fn post(&self, guild_id: GuildId, channel_id: ChannelId, embed: CreateEmbed) {
        let http = self.http.clone();
        tokio::spawn(async move {
            if let Err(e) = channel_id
                .send_message(&http, CreateMessage::new().embed(embed))
                .await
            {
                warn!("❌ No se pudo publicar en el canal {} (guild {}): {:?}", channel_id, guild_id, e);
            }
        });
    }
}

impl PresentationSink for DiscordPresenter {
    fn now_playing(&self, guild_id: GuildId, channel: Option<ChannelId>, snapshot: &NowPlayingSnapshot) {
        let Some(channel_id) = channel else {
            return;
        };

        let embed = embeds::create_now_playing_embed(snapshot, self.repeat_mode(guild_id));
        let generation = snapshot.generation;
        let this = self.clone();
        tokio::spawn(async move {
            match channel_id
                .send_message(&this.http, CreateMessage::new().embed(embed))
                .await
            {
                Ok(message) => {
                    this.follow_now_playing(guild_id, channel_id, message.id, generation)
                        .await
                }
                Err(e) => warn!("❌ No se pudo publicar now playing en guild {}: {:?}", guild_id, e),
            }
        });
    }

    fn queue_snapshot(&self, guild_id: GuildId, channel: Option<ChannelId>, snapshot: &QueueSnapshot) {
        if !snapshot.is_idle() {
            debug!(
                "📋 Cola de guild {} actualizada: {} canciones",
                guild_id,
                snapshot.items.len()
            );
            return;
        }

        if let Some(channel_id) = channel {
            self.post(guild_id, channel_id, embeds::create_queue_finished_embed());
        }
    }

    fn error(&self, guild_id: GuildId, channel: Option<ChannelId>, error: &MusicError) {
        match channel {
            Some(channel_id) => self.post(guild_id, channel_id, embeds::create_music_error_embed(error)),
            None => warn!("⚠️ Error sin canal donde avisar en guild {}: {}", guild_id, error),
        }
    }
}
