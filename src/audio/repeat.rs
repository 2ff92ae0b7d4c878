use crate::audio::{queue::RepeatMode, track::TrackRef};

/// What to do with a track once its stream is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueAction {
    None,
    /// Plays again right away.
    PushFront,
    /// Cycles to the end of the queue.
    PushBack,
}

/// How a stream came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Finished,
    /// The user asked to skip it.
    Skipped,
    /// The stream reported an error or the connection dropped.
    Failed,
}

/// Decides whether a finished track goes back into the queue.
///
/// Evaluated with the repeat mode at the moment of completion, not the one
/// in effect when the track started.
#[derive(Debug, Clone, Copy)]
pub struct RepeatPolicy {
    pub skip_suppresses_track_repeat: bool,
}

impl Default for RepeatPolicy {
    fn default() -> Self {
        Self {
            skip_suppresses_track_repeat: true,
        }
    }
}

impl RepeatPolicy {
    pub fn decide(&self, _track: &TrackRef, mode: RepeatMode, reason: EndReason) -> RequeueAction {
        match (mode, reason) {
            (RepeatMode::Off, _) => RequeueAction::None,
            (RepeatMode::Queue, _) => RequeueAction::PushBack,
            (RepeatMode::Track, EndReason::Finished) => RequeueAction::PushFront,
            (RepeatMode::Track, EndReason::Skipped) if !self.skip_suppresses_track_repeat => {
                RequeueAction::PushFront
            }
            // Un track que falla no se reintenta en bucle
            (RepeatMode::Track, EndReason::Skipped | EndReason::Failed) => RequeueAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_end_follows_mode() {
        let policy = RepeatPolicy::default();
        let track = TrackRef::new("loc", "A", 180);

        assert_eq!(
            policy.decide(&track, RepeatMode::Off, EndReason::Finished),
            RequeueAction::None
        );
        assert_eq!(
            policy.decide(&track, RepeatMode::Track, EndReason::Finished),
            RequeueAction::PushFront
        );
        assert_eq!(
            policy.decide(&track, RepeatMode::Queue, EndReason::Finished),
            RequeueAction::PushBack
        );
    }

    #[test]
    fn test_skip_in_track_mode_is_configurable() {
        let track = TrackRef::new("loc", "A", 180);

        let suppressing = RepeatPolicy::default();
        assert_eq!(
            suppressing.decide(&track, RepeatMode::Track, EndReason::Skipped),
            RequeueAction::None
        );
        assert_eq!(
            suppressing.decide(&track, RepeatMode::Queue, EndReason::Skipped),
            RequeueAction::PushBack
        );

        let faithful = RepeatPolicy {
            skip_suppresses_track_repeat: false,
        };
        assert_eq!(
            faithful.decide(&track, RepeatMode::Track, EndReason::Skipped),
            RequeueAction::PushFront
        );
    }

    #[test]
    fn test_failed_track_is_not_retried() {
        let policy = RepeatPolicy {
            skip_suppresses_track_repeat: false,
        };
        let track = TrackRef::new("loc", "A", 180);

        assert_eq!(
            policy.decide(&track, RepeatMode::Track, EndReason::Failed),
            RequeueAction::None
        );
        assert_eq!(
            policy.decide(&track, RepeatMode::Queue, EndReason::Failed),
            RequeueAction::PushBack
        );
    }
}
