use chrono::{DateTime, Utc};
use futures::{stream, Stream};
use serenity::model::id::GuildId;
use std::time::Duration;
use tracing::debug;

use crate::audio::{queue::NowPlaying, store::GuildQueueStore, track::TrackRef};

/// Point-in-time view of the streaming track.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlayingSnapshot {
    pub track: TrackRef,
    pub started_at: DateTime<Utc>,
    /// Clamped to `[0, total]`.
    pub elapsed: Duration,
    pub total: Duration,
    pub generation: u64,
}

impl NowPlayingSnapshot {
    pub fn at(now_playing: &NowPlaying, now: DateTime<Utc>) -> Self {
        let total = now_playing.track.duration();
        // Un reloj desfasado puede dar negativo o pasar la duración
        let elapsed = (now - now_playing.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .min(total);

        Self {
            track: now_playing.track.clone(),
            started_at: now_playing.started_at,
            elapsed,
            total,
            generation: now_playing.generation,
        }
    }

    /// Fraction played in `[0.0, 1.0]`; `0.0` for tracks without a duration.
    pub fn progress(&self) -> f64 {
        if self.total.is_zero() {
            return 0.0;
        }
        self.elapsed.as_secs_f64() / self.total.as_secs_f64()
    }
}

/// Derives live now-playing snapshots from the guild store.
#[derive(Debug, Clone)]
pub struct NowPlayingTracker {
    store: GuildQueueStore,
    cadence: Duration,
}

impl NowPlayingTracker {
    pub fn new(store: GuildQueueStore, cadence: Duration) -> Self {
        Self { store, cadence }
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    pub fn snapshot(&self, guild_id: GuildId) -> Option<NowPlayingSnapshot> {
        let now = Utc::now();
        self.store
            .read(guild_id, |state| {
                state
                    .now_playing()
                    .map(|np| NowPlayingSnapshot::at(np, now))
            })
            .flatten()
    }

    /// Snapshots of the track playing right now, one immediately and then
    /// one per cadence tick.
    ///
    /// Ends as soon as that track is no longer the one streaming (finished,
    /// skipped, stopped or replaced), so a subscriber never outlives it. Call
    /// again to follow the next track.
    pub fn watch(&self, guild_id: GuildId) -> impl Stream<Item = NowPlayingSnapshot> + Send + 'static {
        let tracked = self.snapshot(guild_id).map(|snap| snap.generation);
        let tracker = self.clone();

        stream::unfold((tracker, tracked, true), move |(tracker, tracked, first)| async move {
            let generation = tracked?;
            if !first {
                tokio::time::sleep(tracker.cadence).await;
            }

            match tracker.snapshot(guild_id) {
                Some(snap) if snap.generation == generation => {
                    Some((snap, (tracker, tracked, false)))
                }
                _ => {
                    debug!(
                        "⏹️ Now playing terminado para guild {} (generación {})",
                        guild_id, generation
                    );
                    None
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::PlaybackPhase;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    fn playing(seconds_ago: i64, duration: u64, generation: u64) -> NowPlaying {
        NowPlaying {
            track: TrackRef::new("loc", "A", duration),
            started_at: Utc::now() - chrono::Duration::seconds(seconds_ago),
            generation,
        }
    }

    #[test]
    fn test_elapsed_is_clamped() {
        let now = Utc::now();

        let np = playing(500, 180, 1);
        let snap = NowPlayingSnapshot::at(&np, now);
        assert_eq!(snap.elapsed, Duration::from_secs(180));
        assert_eq!(snap.progress(), 1.0);

        // started_at en el futuro (drift) -> 0
        let np = playing(-30, 180, 1);
        assert_eq!(NowPlayingSnapshot::at(&np, now).elapsed, Duration::ZERO);

        let np = playing(60, 0, 1);
        let snap = NowPlayingSnapshot::at(&np, now);
        assert_eq!(snap.elapsed, Duration::ZERO);
        assert_eq!(snap.progress(), 0.0);
    }

    #[test]
    fn test_snapshot_absent_without_stream() {
        let store = GuildQueueStore::new(None);
        let tracker = NowPlayingTracker::new(store.clone(), Duration::from_secs(5));
        let guild = GuildId::new(1);

        assert_eq!(tracker.snapshot(guild), None);
        store.enqueue(guild, TrackRef::new("loc", "A", 10)).unwrap();
        assert_eq!(tracker.snapshot(guild), None);
    }

    #[tokio::test]
    async fn test_watch_is_empty_when_idle() {
        let tracker = NowPlayingTracker::new(GuildQueueStore::new(None), Duration::from_secs(5));
        let items: Vec<_> = tracker.watch(GuildId::new(1)).collect().await;
        assert!(items.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_ends_when_track_ends() {
        let store = GuildQueueStore::new(None);
        let tracker = NowPlayingTracker::new(store.clone(), Duration::from_secs(5));
        let guild = GuildId::new(1);

        store.with_state(guild, |state| {
            state.now_playing = Some(playing(10, 180, 3));
            state.phase = PlaybackPhase::Streaming { generation: 3 };
        });

        let mut updates = Box::pin(tracker.watch(guild));
        let first = updates.next().await.unwrap();
        assert_eq!(first.generation, 3);
        assert_eq!(first.track.title(), "A");
        assert!(updates.next().await.is_some());

        store.with_state(guild, |state| {
            state.now_playing = None;
            state.phase = PlaybackPhase::Idle;
        });
        assert_eq!(updates.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_ends_when_track_is_replaced() {
        let store = GuildQueueStore::new(None);
        let tracker = NowPlayingTracker::new(store.clone(), Duration::from_secs(5));
        let guild = GuildId::new(2);

        store.with_state(guild, |state| state.now_playing = Some(playing(0, 180, 1)));
        let mut updates = Box::pin(tracker.watch(guild));
        assert!(updates.next().await.is_some());

        store.with_state(guild, |state| state.now_playing = Some(playing(0, 200, 2)));
        assert_eq!(updates.next().await, None);

        // Un nuevo watch sigue al track nuevo
        let mut fresh = Box::pin(tracker.watch(guild));
        assert_eq!(fresh.next().await.map(|s| s.generation), Some(2));
    }
}
