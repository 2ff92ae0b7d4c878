use chrono::{DateTime, Utc};
use rand::{seq::SliceRandom, Rng};
use serenity::model::id::ChannelId;
use std::{collections::VecDeque, fmt, str::FromStr, time::Duration};
use tracing::{debug, info};

use crate::{
    audio::{repeat::RequeueAction, track::TrackRef},
    error::{MusicError, MusicResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    Track,
    Queue,
}

impl RepeatMode {
    pub fn label(self) -> &'static str {
        match self {
            RepeatMode::Off => "Desactivado",
            RepeatMode::Track => "Canción",
            RepeatMode::Queue => "Cola",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            RepeatMode::Off => "➡️",
            RepeatMode::Track => "🔂",
            RepeatMode::Queue => "🔁",
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            RepeatMode::Off => "off",
            RepeatMode::Track => "track",
            RepeatMode::Queue => "queue",
        };
        f.write_str(value)
    }
}

impl FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(RepeatMode::Off),
            "track" | "song" => Ok(RepeatMode::Track),
            "queue" => Ok(RepeatMode::Queue),
            other => Err(format!("modo de repetición desconocido: {other}")),
        }
    }
}

/// Where the guild's playback state machine currently is.
///
/// `Starting` and `Streaming` carry the generation tag of the attempt they
/// belong to; completions for any other generation are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackPhase {
    #[default]
    Idle,
    Starting { generation: u64 },
    Streaming { generation: u64 },
}

impl PlaybackPhase {
    pub fn is_active(self) -> bool {
        !matches!(self, PlaybackPhase::Idle)
    }

    pub fn streaming_generation(self) -> Option<u64> {
        match self {
            PlaybackPhase::Streaming { generation } => Some(generation),
            _ => None,
        }
    }
}

/// Track currently being streamed, present iff the phase is `Streaming`.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub track: TrackRef,
    pub started_at: DateTime<Utc>,
    pub generation: u64,
}

/// Mutable playback state of one guild.
///
/// Only ever touched through the guild's slot mutex in
/// [`GuildQueueStore`](crate::audio::store::GuildQueueStore).
#[derive(Debug, Default)]
pub struct GuildPlaybackState {
    queue: VecDeque<TrackRef>,
    repeat_mode: RepeatMode,
    max_size: Option<usize>,
    pub(crate) now_playing: Option<NowPlaying>,
    pub(crate) auto_display: Option<ChannelId>,
    pub(crate) phase: PlaybackPhase,
    /// Bumped for every streaming attempt and on stop.
    pub(crate) generation: u64,
    /// Bumped on stop; lets a resolving `play` notice it was cancelled.
    pub(crate) session: u64,
    /// Generation the user asked to skip, if any.
    pub(crate) skip_requested: Option<u64>,
    pub(crate) voice_channel: Option<ChannelId>,
    pub(crate) text_channel: Option<ChannelId>,
}

impl GuildPlaybackState {
    pub fn new(max_size: Option<usize>) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }

    /// Agrega un track al final de la cola y devuelve su posición (1-based)
    pub fn push_back(&mut self, track: TrackRef) -> MusicResult<usize> {
        if let Some(max) = self.max_size {
            if self.queue.len() >= max {
                return Err(MusicError::QueueFull { max });
            }
        }

        info!("➕ Agregado a la cola: {}", track.title());
        self.queue.push_back(track);
        Ok(self.queue.len())
    }

    /// Saca el primer track (FIFO)
    pub fn pop_front(&mut self) -> Option<TrackRef> {
        self.queue.pop_front()
    }

    /// Re-inserts a finished track according to the repeat decision.
    ///
    /// Ignores the size bound: the track held a queue slot until it started.
    pub fn requeue(&mut self, track: TrackRef, action: RequeueAction) {
        match action {
            RequeueAction::None => {}
            RequeueAction::PushFront => {
                info!("🔂 Repitiendo track: {}", track.title());
                self.queue.push_front(track);
            }
            RequeueAction::PushBack => {
                info!("🔁 Track agregado al final por loop de cola: {}", track.title());
                self.queue.push_back(track);
            }
        }
    }

    /// Elimina el track en la posición indicada (1-based)
    pub fn remove(&mut self, position: usize) -> MusicResult<TrackRef> {
        let index = self.checked_index(position)?;
        let removed = self
            .queue
            .remove(index)
            .ok_or(MusicError::InvalidPosition {
                position,
                len: self.queue.len(),
            })?;
        debug!("❌ Track eliminado en posición {}: {}", position, removed.title());
        Ok(removed)
    }

    /// Mueve un track de `from` a `to` (ambas 1-based)
    pub fn move_track(&mut self, from: usize, to: usize) -> MusicResult<TrackRef> {
        let from_index = self.checked_index(from)?;
        let to_index = self.checked_index(to)?;

        let item = self
            .queue
            .remove(from_index)
            .ok_or(MusicError::InvalidPosition {
                position: from,
                len: self.queue.len(),
            })?;
        self.queue.insert(to_index, item.clone());
        debug!("📍 Track movido de posición {} a {}", from, to);
        Ok(item)
    }

    /// Mezcla la cola
    pub fn shuffle(&mut self) -> MusicResult<()> {
        self.shuffle_with(&mut rand::thread_rng())
    }

    /// Fisher-Yates over the queued entries, using the given generator.
    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> MusicResult<()> {
        if self.queue.len() < 2 {
            return Err(MusicError::InsufficientItems {
                len: self.queue.len(),
            });
        }

        self.queue.make_contiguous().shuffle(rng);
        info!("🔀 Cola mezclada ({} canciones)", self.queue.len());
        Ok(())
    }

    /// Limpia la cola y devuelve cuántos tracks se eliminaron
    pub fn clear(&mut self) -> usize {
        let cleared = self.queue.len();
        self.queue.clear();
        info!("🗑️ Cola limpiada: {} tracks removidos", cleared);
        cleared
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn tracks(&self) -> impl Iterator<Item = &TrackRef> {
        self.queue.iter()
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
        match mode {
            RepeatMode::Off => info!("➡️ Repetición desactivada"),
            RepeatMode::Track => info!("🔂 Repetir canción activado"),
            RepeatMode::Queue => info!("🔁 Repetir cola activado"),
        }
    }

    pub fn now_playing(&self) -> Option<&NowPlaying> {
        self.now_playing.as_ref()
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn auto_display(&self) -> Option<ChannelId> {
        self.auto_display
    }

    /// Channel used for unsolicited notices: auto-display first, then the last `/play`.
    pub fn notice_channel(&self) -> Option<ChannelId> {
        self.auto_display.or(self.text_channel)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            now_playing: self.now_playing.as_ref().map(|np| np.track.clone()),
            items: self.queue.iter().cloned().collect(),
            repeat_mode: self.repeat_mode,
            total_duration: self.queue.iter().map(TrackRef::duration).sum(),
        }
    }

    fn checked_index(&self, position: usize) -> MusicResult<usize> {
        // Una cola vacía no tiene posiciones válidas
        if position < 1 || position > self.queue.len() {
            return Err(MusicError::InvalidPosition {
                position,
                len: self.queue.len(),
            });
        }
        Ok(position - 1)
    }
}

/// Copia inmutable de la cola para mostrar
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    pub now_playing: Option<TrackRef>,
    pub items: Vec<TrackRef>,
    pub repeat_mode: RepeatMode,
    /// Sum of the queued (not playing) tracks.
    pub total_duration: Duration,
}

impl QueueSnapshot {
    pub fn is_idle(&self) -> bool {
        self.now_playing.is_none() && self.items.is_empty()
    }

    /// Obtiene una página específica de la cola
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let per_page = items_per_page.max(1);
        let total_items = self.items.len();
        let total_pages = if total_items == 0 {
            1
        } else {
            total_items.div_ceil(per_page)
        };
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * per_page;

        let entries = self
            .items
            .iter()
            .enumerate()
            .skip(start)
            .take(per_page)
            .map(|(index, track)| (index + 1, track.clone()))
            .collect();

        QueuePage {
            entries,
            current_page,
            total_pages,
            total_items,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage {
    /// `(position, track)` with 1-based positions.
    pub entries: Vec<(usize, TrackRef)>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn track(name: &str) -> TrackRef {
        TrackRef::new(format!("https://youtu.be/{name}"), name, 120)
    }

    fn titles(state: &GuildPlaybackState) -> Vec<String> {
        state.tracks().map(|t| t.title().to_string()).collect()
    }

    fn state_with(names: &[&str]) -> GuildPlaybackState {
        let mut state = GuildPlaybackState::new(None);
        for name in names {
            state.push_back(track(name)).unwrap();
        }
        state
    }

    #[test]
    fn test_push_back_keeps_insertion_order() {
        let mut state = GuildPlaybackState::new(None);
        assert_eq!(state.push_back(track("a")).unwrap(), 1);
        assert_eq!(state.push_back(track("b")).unwrap(), 2);
        assert_eq!(state.push_back(track("c")).unwrap(), 3);

        assert_eq!(titles(&state), vec!["a", "b", "c"]);
        assert_eq!(state.pop_front().map(|t| t.title().to_string()), Some("a".into()));
        assert_eq!(titles(&state), vec!["b", "c"]);
    }

    #[test]
    fn test_push_back_respects_bound() {
        let mut state = GuildPlaybackState::new(Some(2));
        state.push_back(track("a")).unwrap();
        state.push_back(track("b")).unwrap();

        assert_eq!(
            state.push_back(track("c")),
            Err(MusicError::QueueFull { max: 2 })
        );
        assert_eq!(titles(&state), vec!["a", "b"]);

        // El requeue del track que acaba de salir no cuenta contra el límite
        state.requeue(track("z"), RequeueAction::PushBack);
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn test_move_track_shifts_others() {
        let mut state = state_with(&["a", "b", "c", "d"]);

        let moved = state.move_track(1, 3).unwrap();
        assert_eq!(moved.title(), "a");
        assert_eq!(titles(&state), vec!["b", "c", "a", "d"]);

        state.move_track(4, 1).unwrap();
        assert_eq!(titles(&state), vec!["d", "b", "c", "a"]);

        state.move_track(2, 2).unwrap();
        assert_eq!(titles(&state), vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn test_move_track_rejects_out_of_range() {
        let mut state = state_with(&["a", "b", "c"]);

        assert_eq!(
            state.move_track(0, 2),
            Err(MusicError::InvalidPosition { position: 0, len: 3 })
        );
        assert_eq!(
            state.move_track(1, 4),
            Err(MusicError::InvalidPosition { position: 4, len: 3 })
        );
        assert_eq!(titles(&state), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_out_of_range_leaves_queue_unchanged() {
        let mut state = state_with(&["a", "b", "c"]);

        assert_eq!(
            state.remove(5),
            Err(MusicError::InvalidPosition { position: 5, len: 3 })
        );
        assert_eq!(titles(&state), vec!["a", "b", "c"]);

        let removed = state.remove(2).unwrap();
        assert_eq!(removed.title(), "b");
        assert_eq!(titles(&state), vec!["a", "c"]);
    }

    #[test]
    fn test_positions_on_empty_queue_are_invalid() {
        let mut state = GuildPlaybackState::new(None);
        assert_eq!(
            state.remove(1),
            Err(MusicError::InvalidPosition { position: 1, len: 0 })
        );
        assert_eq!(
            state.move_track(1, 1),
            Err(MusicError::InvalidPosition { position: 1, len: 0 })
        );
        assert!(state.is_empty());
    }

    #[test]
    fn test_shuffle_needs_two_items() {
        let mut state = state_with(&["solo"]);
        assert_eq!(
            state.shuffle(),
            Err(MusicError::InsufficientItems { len: 1 })
        );
        assert_eq!(titles(&state), vec!["solo"]);
    }

    #[test]
    fn test_shuffle_is_a_permutation() {
        let names: Vec<String> = (0..20).map(|i| format!("t{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut state = state_with(&refs);
        let mut rng = StdRng::seed_from_u64(7);

        let mut orders = std::collections::HashSet::new();
        for _ in 0..5 {
            state.shuffle_with(&mut rng).unwrap();
            let mut shuffled = titles(&state);
            orders.insert(shuffled.clone());
            shuffled.sort();
            let mut expected = names.clone();
            expected.sort();
            assert_eq!(shuffled, expected);
        }
        assert!(orders.len() > 1, "shuffle nunca cambió el orden");
    }

    #[test]
    fn test_requeue_positions() {
        let mut state = state_with(&["b", "c"]);
        state.requeue(track("a"), RequeueAction::PushFront);
        assert_eq!(titles(&state), vec!["a", "b", "c"]);

        state.requeue(track("z"), RequeueAction::PushBack);
        assert_eq!(titles(&state), vec!["a", "b", "c", "z"]);

        state.requeue(track("x"), RequeueAction::None);
        assert_eq!(state.len(), 4);
    }

    #[test]
    fn test_snapshot_pages() {
        let names: Vec<String> = (1..=23).map(|i| format!("t{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let state = state_with(&refs);
        let snapshot = state.snapshot();

        assert_eq!(snapshot.total_duration, Duration::from_secs(23 * 120));

        let page = snapshot.page(3, 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, 3);
        assert_eq!(page.entries.len(), 3);
        assert_eq!(page.entries[0].0, 21);
        assert_eq!(page.entries[0].1.title(), "t21");

        // Página fuera de rango se ajusta a la última
        assert_eq!(snapshot.page(99, 10).current_page, 3);
        assert_eq!(GuildPlaybackState::new(None).snapshot().page(1, 10).total_pages, 1);
    }

    #[test]
    fn test_repeat_mode_parsing() {
        assert_eq!("TRACK".parse::<RepeatMode>(), Ok(RepeatMode::Track));
        assert_eq!("queue".parse::<RepeatMode>(), Ok(RepeatMode::Queue));
        assert!("forever".parse::<RepeatMode>().is_err());
        assert_eq!(RepeatMode::Off.to_string(), "off");
    }
}
