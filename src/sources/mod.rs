//! # Sources
//!
//! Turning a user query into a playable [`TrackRef`]. The engine only talks
//! to the [`Resolver`] trait; [`youtube::YtDlpResolver`] is the production
//! implementation.

pub mod youtube;

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::track::TrackRef;

pub use youtube::YtDlpResolver;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("sin resultados para '{0}'")]
    NotFound(String),
    #[error("{0}")]
    Failed(String),
}

/// Trait común para resolver búsquedas o URLs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Best single match for a direct media URL or free-text search.
    async fn resolve(&self, query: &str) -> Result<TrackRef, ResolveError>;

    /// Up to `limit` search matches for free text, best first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackRef>, ResolveError>;
}
