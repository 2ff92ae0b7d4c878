use dashmap::DashMap;
use serenity::model::id::{GuildId, UserId};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    audio::track::TrackRef,
    error::{MusicError, MusicResult},
    sources::Resolver,
};

/// Resultados mostrados por `/search`
pub const SEARCH_LIMIT: usize = 5;

/// Tiempo durante el que `/pick` puede elegir de la última búsqueda
pub const SEARCH_TTL: Duration = Duration::from_secs(300);

/// Estructura para manejar resultados de búsqueda
#[derive(Debug, Clone)]
pub struct SearchSession {
    pub query: String,
    pub results: Vec<TrackRef>,
    created_at: Instant,
}

/// Last `/search` of every user, per guild, until it expires.
pub struct SearchSessions {
    sessions: DashMap<(GuildId, UserId), SearchSession>,
    ttl: Duration,
}

impl Default for SearchSessions {
    fn default() -> Self {
        Self::new(SEARCH_TTL)
    }
}

impl SearchSessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Searches `query` and remembers the results for `/pick`.
    ///
    /// No lock is held while the resolver runs.
    pub async fn search(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        query: &str,
        resolver: &dyn Resolver,
    ) -> MusicResult<Vec<TrackRef>> {
        info!("🔍 Búsqueda de {} en guild {}: {}", user_id, guild_id, query);
        let results = resolver
            .search(query, SEARCH_LIMIT)
            .await
            .map_err(|e| MusicError::ResolutionFailed {
                query: query.to_string(),
                reason: e.to_string(),
            })?;

        let results: Vec<TrackRef> = results.into_iter().take(SEARCH_LIMIT).collect();
        if results.is_empty() {
            return Err(MusicError::ResolutionFailed {
                query: query.to_string(),
                reason: "sin resultados".to_string(),
            });
        }

        self.purge_expired();
        self.sessions.insert(
            (guild_id, user_id),
            SearchSession {
                query: query.to_string(),
                results: results.clone(),
                created_at: Instant::now(),
            },
        );
        Ok(results)
    }

    /// Result `choice` (1-based) of the user's last search.
    ///
    /// The session stays available so several results can be picked.
    pub fn pick(&self, guild_id: GuildId, user_id: UserId, choice: usize) -> MusicResult<TrackRef> {
        let key = (guild_id, user_id);
        let session = self
            .sessions
            .get(&key)
            .filter(|session| session.created_at.elapsed() < self.ttl)
            .map(|session| session.results.clone());

        let Some(results) = session else {
            self.sessions.remove(&key);
            return Err(MusicError::NoPendingSearch);
        };

        let track = choice
            .checked_sub(1)
            .and_then(|index| results.get(index))
            .cloned()
            .ok_or(MusicError::InvalidPosition {
                position: choice,
                len: results.len(),
            })?;
        debug!("✅ Resultado {} elegido por {}: {}", choice, user_id, track.title());
        Ok(track)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn purge_expired(&self) {
        let ttl = self.ttl;
        self.sessions
            .retain(|_, session| session.created_at.elapsed() < ttl);
    }
}
