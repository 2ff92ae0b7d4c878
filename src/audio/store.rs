use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::debug;

use crate::{
    audio::{
        queue::{GuildPlaybackState, QueueSnapshot},
        track::TrackRef,
    },
    error::MusicResult,
};

/// One guild's state plus the gate that serialises its advances.
///
/// `state` is held only for short synchronous sections. `advance` is an
/// async lock held across transport calls so that at most one
/// pop-and-start sequence runs per guild.
#[derive(Debug)]
pub struct GuildSlot {
    state: Mutex<GuildPlaybackState>,
    advance: tokio::sync::Mutex<()>,
}

impl GuildSlot {
    fn new(max_queue_size: Option<usize>) -> Self {
        Self {
            state: Mutex::new(GuildPlaybackState::new(max_queue_size)),
            advance: tokio::sync::Mutex::new(()),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, GuildPlaybackState> {
        self.state.lock()
    }

    pub(crate) async fn advance_gate(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.advance.lock().await
    }
}

/// Process-wide registry of guild playback state.
///
/// Guilds are independent: each slot has its own locks and nothing here
/// coordinates across guilds. Cloning is cheap and shares the registry.
#[derive(Debug, Clone)]
pub struct GuildQueueStore {
    guilds: Arc<DashMap<GuildId, Arc<GuildSlot>>>,
    max_queue_size: Option<usize>,
}

impl GuildQueueStore {
    pub fn new(max_queue_size: Option<usize>) -> Self {
        Self {
            guilds: Arc::new(DashMap::new()),
            max_queue_size,
        }
    }

    /// Devuelve el slot de la guild, creándolo si no existe
    pub fn slot_or_create(&self, guild_id: GuildId) -> Arc<GuildSlot> {
        // Clonar el Arc para soltar el shard de DashMap antes de bloquear el slot
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("📦 Estado creado para guild {}", guild_id);
                Arc::new(GuildSlot::new(self.max_queue_size))
            })
            .clone()
    }

    pub fn slot(&self, guild_id: GuildId) -> Option<Arc<GuildSlot>> {
        self.guilds.get(&guild_id).map(|slot| slot.clone())
    }

    /// Runs `f` on the guild's state under its lock, creating the state if needed.
    pub fn with_state<R>(&self, guild_id: GuildId, f: impl FnOnce(&mut GuildPlaybackState) -> R) -> R {
        let slot = self.slot_or_create(guild_id);
        let mut state = slot.lock();
        f(&mut state)
    }

    /// Like [`with_state`](Self::with_state) but never creates state.
    pub fn read<R>(&self, guild_id: GuildId, f: impl FnOnce(&GuildPlaybackState) -> R) -> Option<R> {
        let slot = self.slot(guild_id)?;
        let state = slot.lock();
        Some(f(&state))
    }

    pub fn enqueue(&self, guild_id: GuildId, track: TrackRef) -> MusicResult<usize> {
        self.with_state(guild_id, |state| state.push_back(track))
    }

    pub fn dequeue_head(&self, guild_id: GuildId) -> Option<TrackRef> {
        self.read_mut(guild_id, GuildPlaybackState::pop_front)
            .flatten()
    }

    pub fn remove(&self, guild_id: GuildId, position: usize) -> MusicResult<TrackRef> {
        self.with_state(guild_id, |state| state.remove(position))
    }

    pub fn move_track(&self, guild_id: GuildId, from: usize, to: usize) -> MusicResult<TrackRef> {
        self.with_state(guild_id, |state| state.move_track(from, to))
    }

    pub fn shuffle(&self, guild_id: GuildId) -> MusicResult<()> {
        self.with_state(guild_id, GuildPlaybackState::shuffle)
    }

    pub fn clear(&self, guild_id: GuildId) -> usize {
        self.read_mut(guild_id, GuildPlaybackState::clear)
            .unwrap_or(0)
    }

    pub fn snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        self.read(guild_id, GuildPlaybackState::snapshot)
            .unwrap_or_else(|| GuildPlaybackState::default().snapshot())
    }

    /// Drops the guild's state; returns whether there was any.
    pub fn remove_guild(&self, guild_id: GuildId) -> bool {
        self.guilds.remove(&guild_id).is_some()
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.guilds.contains_key(&guild_id)
    }

    fn read_mut<R>(&self, guild_id: GuildId, f: impl FnOnce(&mut GuildPlaybackState) -> R) -> Option<R> {
        let slot = self.slot(guild_id)?;
        let mut state = slot.lock();
        Some(f(&mut state))
    }
}
