use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when fetching or loading RSS feeds
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read feed file {path}: {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Error raised when the feed body is not well-formed XML.
///
/// Carries the byte position of the offending token and the number of
/// complete items scanned before the scan stopped.
#[derive(Error, Debug)]
#[error("Malformed feed XML at byte {position} (after {items_parsed} complete items): {source}")]
pub struct ParseError {
    pub position: u64,
    pub items_parsed: usize,
    #[source]
    pub source: quick_xml::Error,
}

/// Errors that can occur when starting episode playback
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Episode '{title}' has no audio URL")]
    NoAudio { title: String },

    #[error("Invalid audio URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Stream error while fetching {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decode audio stream: {0}")]
    DecodeFailed(#[source] rodio::decoder::DecoderError),

    #[error("Failed to open audio output: {0}")]
    OutputFailed(#[source] rodio::StreamError),

    #[error("Audio output is no longer available")]
    OutputClosed,
}
