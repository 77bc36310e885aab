use std::sync::Arc;

/// Events emitted while loading a feed or starting playback
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Feed is being fetched from URL
    FetchingFeed { url: String },

    /// Feed has been fetched and parsed
    FeedLoaded { episode_count: usize },

    /// An episode's audio stream is being fetched and prepared
    PreparingPlayback { episode_title: String },

    /// Playback of the prepared stream has started
    PlaybackStarted { episode_title: String },

    /// Preparation or playback start failed
    PlaybackFailed {
        episode_title: String,
        error: String,
    },
}

/// Trait for reporting progress events.
///
/// Implementations can use this to display spinners, log messages, or
/// collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
