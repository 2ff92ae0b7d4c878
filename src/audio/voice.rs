use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{Input, YoutubeDl},
    tracks::{PlayMode, TrackHandle},
    CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::audio::transport::{CompletionNotifier, Transport, TransportError};

type NotifierSlot = Arc<Mutex<Option<CompletionNotifier>>>;

struct ActiveStream {
    handle: TrackHandle,
    notifier: NotifierSlot,
}

type ActiveStreams = Arc<DashMap<GuildId, ActiveStream>>;

/// [`Transport`] backed by songbird voice calls and yt-dlp inputs.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    volume: f32,
    streams: ActiveStreams,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, volume: f32) -> Result<Self, TransportError> {
        // Cliente HTTP para YoutubeDl de songbird
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; Discord Music Bot)")
            .build()
            .map_err(|e| TransportError::Stream(e.to_string()))?;

        Ok(Self {
            manager,
            http,
            volume: volume.clamp(0.0, 2.0),
            streams: Arc::new(DashMap::new()),
        })
    }
}

#[async_trait]
impl Transport for SongbirdTransport {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), TransportError> {
        info!("🔗 Conectando al canal {} en guild {}", channel_id, guild_id);

        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| TransportError::Connect(format!("{e:?}")))?;

        let mut call = call.lock().await;
        // Un solo handler por llamada aunque se reconecte
        call.remove_all_global_events();
        call.add_global_event(
            Event::Core(CoreEvent::DriverDisconnect),
            DriverDisconnectHandler {
                guild_id,
                streams: self.streams.clone(),
            },
        );
        Ok(())
    }

    async fn start_stream(
        &self,
        guild_id: GuildId,
        locator: &str,
        notifier: CompletionNotifier,
    ) -> Result<(), TransportError> {
        let call = self
            .manager
            .get(guild_id)
            .ok_or_else(|| TransportError::Stream("sin conexión de voz".to_string()))?;

        let input: Input = YoutubeDl::new(self.http.clone(), locator.to_string()).into();
        let handle = {
            let mut call = call.lock().await;
            call.play_only_input(input)
        };

        if let Err(e) = handle.set_volume(self.volume) {
            debug!("No se pudo ajustar el volumen: {:?}", e);
        }

        // Esperar a que yt-dlp entregue audio reproducible
        if let Err(e) = handle.make_playable_async().await {
            let _ = handle.stop();
            return Err(TransportError::Stream(format!("{e:?}")));
        }

        let notifier: NotifierSlot = Arc::new(Mutex::new(Some(notifier)));
        for event in [TrackEvent::End, TrackEvent::Error] {
            let registered = handle.add_event(
                Event::Track(event),
                StreamEndHandler {
                    guild_id,
                    notifier: notifier.clone(),
                    streams: self.streams.clone(),
                },
            );
            if let Err(e) = registered {
                let _ = handle.stop();
                return Err(TransportError::Stream(format!("{e:?}")));
            }
        }

        let previous = self.streams.insert(guild_id, ActiveStream { handle, notifier });
        if let Some(previous) = previous {
            warn!("🔇 Reemplazando stream activo en guild {}", guild_id);
            end_stream(previous, None);
        }
        Ok(())
    }

    async fn stop_stream(&self, guild_id: GuildId) {
        if let Some((_, stream)) = self.streams.remove(&guild_id) {
            debug!("⏹️ Deteniendo stream en guild {}", guild_id);
            end_stream(stream, None);
        }
    }

    async fn is_streaming(&self, guild_id: GuildId) -> bool {
        // Soltar la referencia de DashMap antes del await
        let handle = match self.streams.get(&guild_id) {
            Some(stream) => stream.handle.clone(),
            None => return false,
        };

        match handle.get_info().await {
            Ok(state) => !matches!(
                state.playing,
                PlayMode::Stop | PlayMode::End | PlayMode::Errored(_)
            ),
            Err(_) => false,
        }
    }

    async fn is_connected(&self, guild_id: GuildId) -> bool {
        match self.manager.get(guild_id) {
            Some(call) => call.lock().await.current_connection().is_some(),
            None => false,
        }
    }

    async fn disconnect(&self, guild_id: GuildId) {
        self.stop_stream(guild_id).await;
        if let Err(e) = self.manager.remove(guild_id).await {
            debug!("Guild {} sin llamada que cerrar: {:?}", guild_id, e);
        } else {
            info!("👋 Desconectado de voz en guild {}", guild_id);
        }
    }
}

/// Stops the track and fires its notifier if no track event will.
fn end_stream(stream: ActiveStream, error: Option<String>) {
    let stopped = stream.handle.stop().is_ok();
    settle_stopped(&stream.notifier, stopped, error);
}

/// A stopped track still raises `End`, which completes the attempt. A failed
/// stop or an error (lost voice connection) completes it here instead.
///
/// Returns whether this call delivered the completion.
fn settle_stopped(notifier: &NotifierSlot, stopped: bool, error: Option<String>) -> bool {
    if stopped && error.is_none() {
        return false;
    }
    fire(notifier, error)
}

/// Fires the notifier unless someone already did.
fn fire(notifier: &NotifierSlot, error: Option<String>) -> bool {
    match notifier.lock().take() {
        Some(notifier) => {
            notifier.notify(error);
            true
        }
        None => false,
    }
}

struct StreamEndHandler {
    guild_id: GuildId,
    notifier: NotifierSlot,
    streams: ActiveStreams,
}

#[async_trait]
impl VoiceEventHandler for StreamEndHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{e:?}")),
                _ => None,
            }),
            _ => None,
        };

        self.streams
            .remove_if(&self.guild_id, |_, stream| Arc::ptr_eq(&stream.notifier, &self.notifier));
        match &error {
            Some(e) => warn!("❌ Stream con error en guild {}: {}", self.guild_id, e),
            None => debug!("Track terminado en guild {}", self.guild_id),
        }
        fire(&self.notifier, error);

        Some(Event::Cancel)
    }
}

struct DriverDisconnectHandler {
    guild_id: GuildId,
    streams: ActiveStreams,
}

#[async_trait]
impl VoiceEventHandler for DriverDisconnectHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(_) = ctx {
            if let Some((_, stream)) = self.streams.remove(&self.guild_id) {
                warn!("🔌 Conexión de voz perdida en guild {}", self.guild_id);
                end_stream(stream, Some("conexión de voz perdida".to_string()));
            }
        }
        None
    }
}
