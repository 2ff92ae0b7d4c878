//! # Error Types
//!
//! Every operation exposed to command handlers returns [`MusicResult`]. The
//! variants are recoverable: handlers turn them into a message for the user
//! and the guild's playback state is never left half-mutated by a failure.

use thiserror::Error;

/// Errores tipados de la capa de reproducción.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MusicError {
    /// The invoking user is not in a voice channel (or none was recorded).
    #[error("Debes estar en un canal de voz")]
    NotInVoiceContext,

    #[error("No se pudo conectar al canal de voz: {0}")]
    ConnectFailed(String),

    #[error("No se encontró nada para '{query}': {reason}")]
    ResolutionFailed { query: String, reason: String },

    #[error("No se pudo iniciar '{title}': {reason}")]
    StreamStartFailed { title: String, reason: String },

    /// A 1-based position outside `1..=len`.
    #[error("Posición {position} inválida (la cola tiene {len} canciones)")]
    InvalidPosition { position: usize, len: usize },

    #[error("Se necesitan al menos 2 canciones para mezclar (hay {len})")]
    InsufficientItems { len: usize },

    #[error("La cola está vacía")]
    EmptyQueue,

    #[error("La cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },

    #[error("No hay nada reproduciéndose")]
    NothingPlaying,

    /// A stream ended with an error or the voice connection dropped mid-track.
    #[error("'{title}' se interrumpió: {reason}")]
    StreamInterrupted { title: String, reason: String },

    /// Consecutive start failures hit the configured bound; the engine went idle.
    #[error("No se puede iniciar la reproducción tras {attempts} fallos seguidos: {reason}")]
    PlaybackHalted { attempts: u32, reason: String },

    /// `stop` arrived while the query was still being resolved.
    #[error("La reproducción se detuvo mientras se buscaba la canción")]
    Cancelled,

    /// `/pick` without a recent `/search` from the same user.
    #[error("No hay una búsqueda reciente; usa `/search` primero")]
    NoPendingSearch,
}

pub type MusicResult<T> = Result<T, MusicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_include_context() {
        let err = MusicError::InvalidPosition { position: 5, len: 3 };
        assert_eq!(
            err.to_string(),
            "Posición 5 inválida (la cola tiene 3 canciones)"
        );

        let err = MusicError::PlaybackHalted {
            attempts: 2,
            reason: "sin formato".to_string(),
        };
        assert!(err.to_string().contains("2 fallos"));
    }
}
