//! In-memory collaborators for engine tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use crate::{
    audio::{
        now_playing::NowPlayingSnapshot,
        queue::QueueSnapshot,
        transport::{CompletionNotifier, PresentationSink, Transport, TransportError},
    },
    error::MusicError,
};

/// Transport that keeps streams as pending notifiers.
///
/// Flags any `start_stream` issued while the guild still has a live stream.
#[derive(Default)]
pub struct FakeTransport {
    active: Mutex<HashMap<GuildId, CompletionNotifier>>,
    started: Mutex<Vec<(GuildId, String, u64)>>,
    failing: Mutex<HashSet<String>>,
    connected: Mutex<HashSet<GuildId>>,
    refuse_connect: AtomicBool,
    overlap: AtomicBool,
    start_delay: Option<Duration>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start_delay(delay: Duration) -> Self {
        Self {
            start_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_locator(&self, locator: &str) {
        self.failing.lock().insert(locator.to_string());
    }

    pub fn refuse_connections(&self) {
        self.refuse_connect.store(true, Ordering::SeqCst);
    }

    /// Ends the guild's live stream as if the transport finished it.
    pub fn finish(&self, guild_id: GuildId, error: Option<&str>) -> bool {
        let notifier = self.active.lock().remove(&guild_id);
        match notifier {
            Some(notifier) => {
                notifier.notify(error.map(str::to_string));
                true
            }
            None => false,
        }
    }

    /// `(guild, locator, generation)` for every successful start, in order.
    pub fn started(&self) -> Vec<(GuildId, String, u64)> {
        self.started.lock().clone()
    }

    pub fn started_locators(&self) -> Vec<String> {
        self.started.lock().iter().map(|(_, locator, _)| locator.clone()).collect()
    }

    pub fn live_generation(&self, guild_id: GuildId) -> Option<u64> {
        self.active.lock().get(&guild_id).map(CompletionNotifier::generation)
    }

    pub fn saw_overlap(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }

    pub fn connected(&self, guild_id: GuildId) -> bool {
        self.connected.lock().contains(&guild_id)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, guild_id: GuildId, _channel_id: ChannelId) -> Result<(), TransportError> {
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("rechazada".to_string()));
        }
        self.connected.lock().insert(guild_id);
        Ok(())
    }

    async fn start_stream(
        &self,
        guild_id: GuildId,
        locator: &str,
        notifier: CompletionNotifier,
    ) -> Result<(), TransportError> {
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(locator) {
            return Err(TransportError::Stream(format!("{locator} no reproducible")));
        }

        let generation = notifier.generation();
        let mut active = self.active.lock();
        if active.contains_key(&guild_id) {
            self.overlap.store(true, Ordering::SeqCst);
        }
        active.insert(guild_id, notifier);
        self.started
            .lock()
            .push((guild_id, locator.to_string(), generation));
        Ok(())
    }

    async fn stop_stream(&self, guild_id: GuildId) {
        self.finish(guild_id, None);
    }

    async fn is_streaming(&self, guild_id: GuildId) -> bool {
        self.active.lock().contains_key(&guild_id)
    }

    async fn is_connected(&self, guild_id: GuildId) -> bool {
        self.connected(guild_id)
    }

    async fn disconnect(&self, guild_id: GuildId) {
        self.finish(guild_id, None);
        self.connected.lock().remove(&guild_id);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Presented {
    NowPlaying(String, Option<ChannelId>),
    Queue(Vec<String>),
    Error(MusicError),
}

#[derive(Default)]
pub struct RecordingPresenter {
    events: Mutex<Vec<Presented>>,
}

impl RecordingPresenter {
    pub fn events(&self) -> Vec<Presented> {
        self.events.lock().clone()
    }

    pub fn errors(&self) -> Vec<MusicError> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Presented::Error(err) => Some(err.clone()),
                _ => None,
            })
            .collect()
    }
}

impl PresentationSink for RecordingPresenter {
    fn now_playing(&self, _guild_id: GuildId, channel: Option<ChannelId>, snapshot: &NowPlayingSnapshot) {
        self.events
            .lock()
            .push(Presented::NowPlaying(snapshot.track.title().to_string(), channel));
    }

    fn queue_snapshot(&self, _guild_id: GuildId, _channel: Option<ChannelId>, snapshot: &QueueSnapshot) {
        let titles = snapshot.items.iter().map(|t| t.title().to_string()).collect();
        self.events.lock().push(Presented::Queue(titles));
    }

    fn error(&self, _guild_id: GuildId, _channel: Option<ChannelId>, error: &MusicError) {
        self.events.lock().push(Presented::Error(error.clone()));
    }
}

/// Polls `condition` until it holds, panicking after about two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("la condición nunca se cumplió");
}
