//! # Playback Engine
//!
//! Per-guild state machine: `Idle → Starting → Streaming → Idle`.
//!
//! Every streaming attempt gets a generation tag taken from a process-wide
//! counter. The transport reports the end of a stream through a
//! [`CompletionNotifier`] bound to that tag; completions travel through a
//! per-guild mailbox task and are dropped when the tag is no longer the one
//! streaming. `stop` bumps the tag so that in-flight starts and late
//! completions are discarded.
//!
//! Locking: the slot's state mutex only guards synchronous sections. The
//! slot's advance gate is held across transport calls, so only one
//! pop-and-start sequence runs per guild at a time.

use chrono::Utc;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        now_playing::NowPlayingSnapshot,
        queue::{GuildPlaybackState, NowPlaying, PlaybackPhase, QueueSnapshot, RepeatMode},
        repeat::{EndReason, RepeatPolicy, RequeueAction},
        store::{GuildQueueStore, GuildSlot},
        track::TrackRef,
        transport::{Completion, CompletionNotifier, PresentationSink, Transport, TransportError},
    },
    error::{MusicError, MusicResult},
    sources::Resolver,
};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub repeat: RepeatPolicy,
    /// Consecutive start failures tolerated before giving up (at least 1).
    pub max_start_failures: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            repeat: RepeatPolicy::default(),
            max_start_failures: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    /// This call started the given track.
    Started(TrackRef),
    /// Something is already starting or streaming.
    AlreadyActive,
    /// Queue empty, nothing to do.
    Idle,
    /// A stop arrived while the start was in flight.
    Abandoned,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopSummary {
    pub cleared: usize,
    pub was_playing: bool,
}

#[derive(Debug, Clone)]
pub struct PlayRequest {
    /// Voice channel of the requesting user.
    pub voice_channel: Option<ChannelId>,
    /// Channel the command came from.
    pub text_channel: Option<ChannelId>,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayOutcome {
    pub track: TrackRef,
    /// 1-based queue position when the track was queued behind others.
    pub position: Option<usize>,
    pub started: bool,
}

enum StartCommit {
    Streaming {
        channel: Option<ChannelId>,
        snapshot: NowPlayingSnapshot,
    },
    Failed {
        channel: Option<ChannelId>,
    },
    Abandoned,
}

struct Settled {
    finished: TrackRef,
    reason: EndReason,
    channel: Option<ChannelId>,
    requeued: Option<QueueSnapshot>,
}

pub struct PlaybackEngine {
    store: GuildQueueStore,
    transport: Arc<dyn Transport>,
    presenter: Arc<dyn PresentationSink>,
    options: EngineOptions,
    generations: AtomicU64,
    mailboxes: DashMap<GuildId, UnboundedSender<Completion>>,
    this: Weak<PlaybackEngine>,
}

impl PlaybackEngine {
    pub fn new(
        store: GuildQueueStore,
        transport: Arc<dyn Transport>,
        presenter: Arc<dyn PresentationSink>,
        options: EngineOptions,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            store,
            transport,
            presenter,
            options,
            generations: AtomicU64::new(0),
            mailboxes: DashMap::new(),
            this: this.clone(),
        })
    }

    pub fn store(&self) -> &GuildQueueStore {
        &self.store
    }

    /// Records the guild's voice channel and connects if needed.
    pub async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()> {
        let slot = self.store.slot_or_create(guild_id);
        self.join_slot(guild_id, &slot, channel_id).await
    }

    pub fn enqueue(&self, guild_id: GuildId, track: TrackRef) -> MusicResult<usize> {
        self.store.enqueue(guild_id, track)
    }

    /// Resolves `query`, queues the result and makes sure playback runs.
    ///
    /// The resolver runs without any guild lock held. A `stop` or `teardown`
    /// issued meanwhile cancels the request instead of queueing a stale track.
    pub async fn play_query(
        &self,
        guild_id: GuildId,
        request: PlayRequest,
        resolver: &dyn Resolver,
    ) -> MusicResult<PlayOutcome> {
        let voice_channel = request.voice_channel.ok_or(MusicError::NotInVoiceContext)?;
        let (slot, session) = self
            .prepare_play(guild_id, voice_channel, request.text_channel)
            .await?;

        let track = resolver
            .resolve(&request.query)
            .await
            .map_err(|e| MusicError::ResolutionFailed {
                query: request.query.clone(),
                reason: e.to_string(),
            })?;

        self.queue_and_advance(guild_id, &slot, session, track).await
    }

    /// Queues an already resolved track (a picked search result) and makes
    /// sure playback runs.
    pub async fn play_track(
        &self,
        guild_id: GuildId,
        voice_channel: Option<ChannelId>,
        text_channel: Option<ChannelId>,
        track: TrackRef,
    ) -> MusicResult<PlayOutcome> {
        let voice_channel = voice_channel.ok_or(MusicError::NotInVoiceContext)?;
        let (slot, session) = self.prepare_play(guild_id, voice_channel, text_channel).await?;
        self.queue_and_advance(guild_id, &slot, session, track).await
    }

    /// Starts the head of the queue if nothing is starting or streaming.
    ///
    /// A failed start drops that track and tries the next one, up to
    /// `max_start_failures` consecutive failures.
    pub async fn ensure_advancing(&self, guild_id: GuildId) -> MusicResult<AdvanceOutcome> {
        // Sin estado no hay cola que avanzar; nunca se recrea una guild eliminada
        let Some(slot) = self.store.slot(guild_id) else {
            return Ok(AdvanceOutcome::Idle);
        };
        let _gate = slot.advance_gate().await;
        let mut failures = 0u32;

        loop {
            let voice_channel = {
                let state = slot.lock();
                if state.phase.is_active() {
                    return Ok(AdvanceOutcome::AlreadyActive);
                }
                if state.is_empty() {
                    return Ok(AdvanceOutcome::Idle);
                }
                state.voice_channel
            };

            self.ensure_connected(guild_id, voice_channel).await?;
            if self.transport.is_streaming(guild_id).await {
                warn!("🔇 Stream huérfano en guild {}, deteniéndolo", guild_id);
                self.transport.stop_stream(guild_id).await;
            }

            // Revalidar: la cola pudo cambiar mientras conectábamos
            let (track, generation) = {
                let mut state = slot.lock();
                if state.phase.is_active() {
                    return Ok(AdvanceOutcome::AlreadyActive);
                }
                let Some(track) = state.pop_front() else {
                    return Ok(AdvanceOutcome::Idle);
                };
                let generation = self.next_generation();
                state.generation = generation;
                state.phase = PlaybackPhase::Starting { generation };
                state.skip_requested = None;
                (track, generation)
            };

            info!(
                "🎵 Reproduciendo: {} (guild {}, generación {})",
                track.title(),
                guild_id,
                generation
            );
            let notifier = CompletionNotifier::new(guild_id, generation, self.mailbox(guild_id));
            let started = self
                .transport
                .start_stream(guild_id, track.locator(), notifier)
                .await;

            let failure = started.as_ref().err().map(TransportError::to_string);
            let commit = {
                let mut state = slot.lock();
                commit_start(&mut state, generation, &track, started.is_ok())
            };

            match commit {
                StartCommit::Streaming { channel, snapshot } => {
                    self.presenter.now_playing(guild_id, channel, &snapshot);
                    return Ok(AdvanceOutcome::Started(track));
                }
                StartCommit::Abandoned => {
                    info!("🚫 Inicio de '{}' abandonado por stop en guild {}", track.title(), guild_id);
                    if started.is_ok() {
                        self.transport.stop_stream(guild_id).await;
                    }
                    return Ok(AdvanceOutcome::Abandoned);
                }
                StartCommit::Failed { channel } => {
                    failures += 1;
                    let reason = failure.unwrap_or_default();
                    warn!(
                        "❌ No se pudo iniciar '{}' en guild {} ({}/{}): {}",
                        track.title(),
                        guild_id,
                        failures,
                        self.options.max_start_failures,
                        reason
                    );

                    if failures >= self.options.max_start_failures.max(1) {
                        // El último track fallido no se reporta por separado
                        return Err(MusicError::PlaybackHalted {
                            attempts: failures,
                            reason: format!("'{}': {}", track.title(), reason),
                        });
                    }
                    self.presenter.error(
                        guild_id,
                        channel,
                        &MusicError::StreamStartFailed {
                            title: track.title().to_string(),
                            reason,
                        },
                    );
                }
            }
        }
    }

    /// Handles the end of a stream and moves on to the next track.
    ///
    /// Completions whose generation is not the one streaming are ignored.
    pub async fn process_completion(&self, completion: Completion) {
        let guild_id = completion.guild_id;
        let Some(slot) = self.store.slot(guild_id) else {
            debug!("📭 Completion para guild {} sin estado, descartada", guild_id);
            return;
        };

        let settled = {
            // Esperar a que un inicio en curso termine de confirmarse
            let _gate = slot.advance_gate().await;
            let mut state = slot.lock();
            settle_completion(&mut state, &completion, &self.options.repeat)
        };

        let Some(settled) = settled else {
            debug!(
                "🗑️ Completion obsoleta descartada (guild {}, generación {})",
                guild_id, completion.generation
            );
            return;
        };

        info!(
            "⏭️ Terminó '{}' en guild {} ({:?})",
            settled.finished.title(),
            guild_id,
            settled.reason
        );

        if let (EndReason::Failed, Some(reason)) = (settled.reason, completion.error) {
            self.presenter.error(
                guild_id,
                settled.channel,
                &MusicError::StreamInterrupted {
                    title: settled.finished.title().to_string(),
                    reason,
                },
            );
        }
        if let Some(snapshot) = &settled.requeued {
            self.presenter.queue_snapshot(guild_id, settled.channel, snapshot);
        }

        match self.ensure_advancing(guild_id).await {
            Ok(AdvanceOutcome::Idle) => {
                info!("📭 Cola vacía en guild {}", guild_id);
                let snapshot = self.store.snapshot(guild_id);
                self.presenter.queue_snapshot(guild_id, settled.channel, &snapshot);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("❌ Error al avanzar en guild {}: {}", guild_id, e);
                self.presenter.error(guild_id, settled.channel, &e);
            }
        }
    }

    /// Ends the current track; it is not replayed in track-repeat mode
    /// unless configured otherwise.
    pub async fn skip(&self, guild_id: GuildId) -> MusicResult<TrackRef> {
        let slot = self.store.slot(guild_id).ok_or(MusicError::NothingPlaying)?;
        let _gate = slot.advance_gate().await;

        let skipped = {
            let mut state = slot.lock();
            let generation = state
                .phase
                .streaming_generation()
                .ok_or(MusicError::NothingPlaying)?;
            let track = state
                .now_playing
                .as_ref()
                .map(|np| np.track.clone())
                .ok_or(MusicError::NothingPlaying)?;
            state.skip_requested = Some(generation);
            track
        };

        info!("⏭️ Saltando '{}' en guild {}", skipped.title(), guild_id);
        self.transport.stop_stream(guild_id).await;
        Ok(skipped)
    }

    /// Clears the queue, ends the stream and leaves the voice channel.
    pub async fn stop(&self, guild_id: GuildId) -> MusicResult<StopSummary> {
        let Some(slot) = self.store.slot(guild_id) else {
            return Ok(StopSummary::default());
        };

        // Invalidar primero para que un inicio en curso se abandone
        let first = {
            let mut state = slot.lock();
            self.reset_for_stop(&mut state)
        };

        let _gate = slot.advance_gate().await;
        let second = {
            let mut state = slot.lock();
            self.reset_for_stop(&mut state)
        };

        self.transport.stop_stream(guild_id).await;
        self.transport.disconnect(guild_id).await;
        info!("⏹️ Reproducción detenida en guild {}", guild_id);

        Ok(StopSummary {
            cleared: first.cleared + second.cleared,
            was_playing: first.was_playing || second.was_playing,
        })
    }

    /// Stops and forgets the guild; no task references its state afterwards.
    pub async fn teardown(&self, guild_id: GuildId) {
        if let Err(e) = self.stop(guild_id).await {
            warn!("Error al detener guild {} durante teardown: {}", guild_id, e);
        }
        self.store.remove_guild(guild_id);
        self.mailboxes.remove(&guild_id);
        info!("👋 Estado de guild {} eliminado", guild_id);
    }

    /// Returns the previous mode.
    pub fn set_repeat_mode(&self, guild_id: GuildId, mode: RepeatMode) -> RepeatMode {
        self.store.with_state(guild_id, |state| {
            let previous = state.repeat_mode();
            state.set_repeat_mode(mode);
            previous
        })
    }

    pub fn remove(&self, guild_id: GuildId, position: usize) -> MusicResult<TrackRef> {
        self.store.remove(guild_id, position)
    }

    pub fn move_track(&self, guild_id: GuildId, from: usize, to: usize) -> MusicResult<TrackRef> {
        self.store.move_track(guild_id, from, to)
    }

    pub fn shuffle(&self, guild_id: GuildId) -> MusicResult<()> {
        self.store.shuffle(guild_id)
    }

    pub fn clear(&self, guild_id: GuildId) -> usize {
        self.store.clear(guild_id)
    }

    pub fn queue_snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        self.store.snapshot(guild_id)
    }

    pub fn now_playing_snapshot(&self, guild_id: GuildId) -> Option<NowPlayingSnapshot> {
        let now = Utc::now();
        self.store
            .read(guild_id, |state| {
                state.now_playing().map(|np| NowPlayingSnapshot::at(np, now))
            })
            .flatten()
    }

    /// Voice channel the guild should be connected to; `None` after a stop.
    pub fn voice_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.store.read(guild_id, |state| state.voice_channel).flatten()
    }

    pub fn phase(&self, guild_id: GuildId) -> PlaybackPhase {
        self.store
            .read(guild_id, GuildPlaybackState::phase)
            .unwrap_or_default()
    }

    /// Turns auto-display on (bound to `channel_id`) or off; returns the new state.
    pub fn toggle_auto_display(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        self.store.with_state(guild_id, |state| {
            state.auto_display = match state.auto_display {
                Some(_) => None,
                None => Some(channel_id),
            };
            state.auto_display.is_some()
        })
    }

    async fn join_slot(&self, guild_id: GuildId, slot: &GuildSlot, channel_id: ChannelId) -> MusicResult<()> {
        slot.lock().voice_channel = Some(channel_id);

        let _gate = slot.advance_gate().await;
        self.ensure_connected(guild_id, Some(channel_id)).await
    }

    /// Records the channels and joins voice; returns the slot and stop-session
    /// the later enqueue must still match.
    async fn prepare_play(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: Option<ChannelId>,
    ) -> MusicResult<(Arc<GuildSlot>, u64)> {
        let slot = self.store.slot_or_create(guild_id);
        let session = {
            let mut state = slot.lock();
            if text_channel.is_some() {
                state.text_channel = text_channel;
            }
            state.session
        };

        self.join_slot(guild_id, &slot, voice_channel).await?;
        Ok((slot, session))
    }

    async fn queue_and_advance(
        &self,
        guild_id: GuildId,
        slot: &GuildSlot,
        session: u64,
        track: TrackRef,
    ) -> MusicResult<PlayOutcome> {
        // stop y teardown cambian la sesión del slot capturado; si la guild se
        // eliminó, el slot huérfano ya no coincide
        let position = {
            let mut state = slot.lock();
            if state.session != session {
                debug!("🚫 '{}' descartado: guild {} detenida mientras se resolvía", track.title(), guild_id);
                return Err(MusicError::Cancelled);
            }
            state.push_back(track.clone())?
        };

        let outcome = self.ensure_advancing(guild_id).await?;
        let started = position == 1 && outcome == AdvanceOutcome::Started(track.clone());

        Ok(PlayOutcome {
            track,
            position: (!started).then_some(position),
            started,
        })
    }

    async fn ensure_connected(&self, guild_id: GuildId, voice_channel: Option<ChannelId>) -> MusicResult<()> {
        if self.transport.is_connected(guild_id).await {
            return Ok(());
        }

        let channel_id = voice_channel.ok_or(MusicError::NotInVoiceContext)?;
        self.transport
            .connect(guild_id, channel_id)
            .await
            .map_err(|e| MusicError::ConnectFailed(e.to_string()))?;
        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(())
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn reset_for_stop(&self, state: &mut GuildPlaybackState) -> StopSummary {
        let was_playing = state.now_playing.take().is_some() || state.phase.is_active();
        let cleared = state.clear();
        state.generation = self.next_generation();
        state.session += 1;
        state.phase = PlaybackPhase::Idle;
        state.skip_requested = None;
        state.voice_channel = None;
        StopSummary { cleared, was_playing }
    }

    fn mailbox(&self, guild_id: GuildId) -> UnboundedSender<Completion> {
        self.mailboxes
            .entry(guild_id)
            .or_insert_with(|| {
                let (sender, receiver) = mpsc::unbounded_channel();
                tokio::spawn(run_mailbox(self.this.clone(), guild_id, receiver));
                sender
            })
            .clone()
    }
}

/// Processes one guild's completions in arrival order.
async fn run_mailbox(
    engine: Weak<PlaybackEngine>,
    guild_id: GuildId,
    mut receiver: UnboundedReceiver<Completion>,
) {
    debug!("📬 Buzón de completions abierto para guild {}", guild_id);
    while let Some(completion) = receiver.recv().await {
        let Some(engine) = engine.upgrade() else {
            break;
        };
        engine.process_completion(completion).await;
    }
    debug!("📪 Buzón de completions cerrado para guild {}", guild_id);
}

fn commit_start(
    state: &mut GuildPlaybackState,
    generation: u64,
    track: &TrackRef,
    started: bool,
) -> StartCommit {
    if state.generation != generation {
        return StartCommit::Abandoned;
    }

    if !started {
        state.phase = PlaybackPhase::Idle;
        return StartCommit::Failed {
            channel: state.notice_channel(),
        };
    }

    let now_playing = NowPlaying {
        track: track.clone(),
        started_at: Utc::now(),
        generation,
    };
    let snapshot = NowPlayingSnapshot::at(&now_playing, now_playing.started_at);
    state.now_playing = Some(now_playing);
    state.phase = PlaybackPhase::Streaming { generation };

    StartCommit::Streaming {
        channel: state.auto_display,
        snapshot,
    }
}

fn settle_completion(
    state: &mut GuildPlaybackState,
    completion: &Completion,
    policy: &RepeatPolicy,
) -> Option<Settled> {
    if state.generation != completion.generation
        || state.phase.streaming_generation() != Some(completion.generation)
    {
        return None;
    }

    let finished = state.now_playing.take()?.track;
    state.phase = PlaybackPhase::Idle;

    let skipped = state.skip_requested.take() == Some(completion.generation);
    let reason = if skipped {
        EndReason::Skipped
    } else if completion.error.is_some() {
        EndReason::Failed
    } else {
        EndReason::Finished
    };

    let action = policy.decide(&finished, state.repeat_mode(), reason);
    state.requeue(finished.clone(), action);

    Some(Settled {
        finished,
        reason,
        channel: state.notice_channel(),
        requeued: (action != RequeueAction::None).then(|| state.snapshot()),
    })
}
