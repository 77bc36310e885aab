pub mod error;
pub mod feed;
pub mod http;
pub mod player;
pub mod progress;

// Re-export main types for convenience
pub use error::{FeedError, ParseError, PlaybackError};
pub use feed::{
    Episode, fetch_episodes, is_url, load_feed, parse_feed, parse_feed_file, parse_feed_lossy,
};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use player::{AudioSink, PlaybackState, Player, RodioSink};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
