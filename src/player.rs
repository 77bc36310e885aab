// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use parking_lot::Mutex;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::error::PlaybackError;
use crate::feed::Episode;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// State of the single playback session, published on a watch channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Preparing { episode_title: String },
    Playing { episode_title: String },
    Failed { episode_title: String, error: String },
}

/// Audio backend abstraction for testability.
///
/// `play` replaces whatever is currently audible with the given stream;
/// implementations never keep more than one stream live.
pub trait AudioSink: Send + 'static {
    /// Decode the audio bytes and start playback, replacing the current
    /// stream if one is playing
    fn play(&mut self, audio: Bytes) -> Result<(), PlaybackError>;

    /// Stop the current stream, if any
    fn stop(&mut self);
}

/// Manages the single live playback session.
///
/// Starting a new episode implicitly abandons the previous one: any
/// in-flight preparation task is aborted, the sink is stopped, and a fresh
/// preparation task fetches the new stream and starts it once ready.
pub struct Player<C, S> {
    client: C,
    sink: Arc<Mutex<S>>,
    reporter: SharedProgressReporter,
    // Bumped on every play()/stop(); a preparation task that finishes with a
    // stale generation discards its result instead of touching the sink
    generation: Arc<AtomicU64>,
    prepare: Option<JoinHandle<()>>,
    state_tx: watch::Sender<PlaybackState>,
}

impl<C, S> Player<C, S>
where
    C: HttpClient + Clone + 'static,
    S: AudioSink,
{
    pub fn new(client: C, sink: S, reporter: SharedProgressReporter) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::Idle);
        Self {
            client,
            sink: Arc::new(Mutex::new(sink)),
            reporter,
            generation: Arc::new(AtomicU64::new(0)),
            prepare: None,
            state_tx,
        }
    }

    /// Subscribe to playback state transitions
    pub fn state(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    /// Start playback of an episode, replacing any current session.
    ///
    /// Returns immediately; the stream is fetched and prepared on a
    /// background task, and the outcome is published via the state channel
    /// and the progress reporter. Fails fast when the episode has no audio
    /// URL or the URL does not parse.
    pub fn play(&mut self, episode: &Episode) -> Result<(), PlaybackError> {
        if !episode.has_audio() {
            return Err(PlaybackError::NoAudio {
                title: episode.title.clone(),
            });
        }
        Url::parse(&episode.audio_url)?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(handle) = self.prepare.take() {
            handle.abort();
        }
        self.sink.lock().stop();

        let title = episode.title.clone();
        let url = episode.audio_url.clone();
        debug!("preparing playback of '{title}' from {url}");

        self.state_tx.send_replace(PlaybackState::Preparing {
            episode_title: title.clone(),
        });
        self.reporter.report(ProgressEvent::PreparingPlayback {
            episode_title: title.clone(),
        });

        let client = self.client.clone();
        let sink = Arc::clone(&self.sink);
        let generations = Arc::clone(&self.generation);
        let state_tx = self.state_tx.clone();
        let reporter = Arc::clone(&self.reporter);

        self.prepare = Some(tokio::spawn(async move {
            let outcome = match fetch_audio(&client, &url).await {
                Ok(audio) => {
                    let mut sink = sink.lock();
                    // Re-check under the lock: a newer play() may have
                    // superseded this session while we were fetching
                    if generations.load(Ordering::SeqCst) != generation {
                        debug!("discarding superseded stream for '{title}'");
                        return;
                    }
                    sink.play(audio)
                }
                Err(e) => Err(e),
            };

            publish_outcome(&generations, generation, &state_tx, &reporter, &title, outcome);
        }));

        Ok(())
    }

    /// Stop the current session, aborting preparation if still in flight
    pub fn stop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.prepare.take() {
            handle.abort();
        }
        self.sink.lock().stop();
        self.state_tx.send_replace(PlaybackState::Idle);
    }
}

/// Publish a preparation outcome on the state channel and reporter, unless
/// a newer play() or stop() superseded the session after the sink lock was
/// released
fn publish_outcome(
    generations: &AtomicU64,
    generation: u64,
    state_tx: &watch::Sender<PlaybackState>,
    reporter: &SharedProgressReporter,
    title: &str,
    outcome: Result<(), PlaybackError>,
) {
    if generations.load(Ordering::SeqCst) != generation {
        debug!("discarding outcome of superseded session for '{title}'");
        return;
    }

    match outcome {
        Ok(()) => {
            state_tx.send_replace(PlaybackState::Playing {
                episode_title: title.to_string(),
            });
            reporter.report(ProgressEvent::PlaybackStarted {
                episode_title: title.to_string(),
            });
        }
        Err(e) => publish_failure(state_tx, reporter, title, &e),
    }
}

fn publish_failure(
    state_tx: &watch::Sender<PlaybackState>,
    reporter: &SharedProgressReporter,
    title: &str,
    error: &PlaybackError,
) {
    warn!("playback of '{title}' failed: {error}");
    state_tx.send_replace(PlaybackState::Failed {
        episode_title: title.to_string(),
        error: error.to_string(),
    });
    reporter.report(ProgressEvent::PlaybackFailed {
        episode_title: title.to_string(),
        error: error.to_string(),
    });
}

/// Fetch the full audio stream into memory, checking the HTTP status
async fn fetch_audio<C: HttpClient>(client: &C, url: &str) -> Result<Bytes, PlaybackError> {
    let response = client
        .get_stream(url)
        .await
        .map_err(|e| PlaybackError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if !(200..300).contains(&response.status) {
        return Err(PlaybackError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    let mut body = response.body;
    let mut audio = BytesMut::with_capacity(response.content_length.unwrap_or(0) as usize);
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| PlaybackError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;
        audio.extend_from_slice(&chunk);
    }

    Ok(audio.freeze())
}

enum SinkCommand {
    Play {
        audio: Bytes,
        reply: mpsc::Sender<Result<(), PlaybackError>>,
    },
    Stop,
    Shutdown,
}

/// Default [`AudioSink`] backed by rodio.
///
/// A dedicated engine thread owns the output stream and the current
/// `rodio::Sink`; the output device is opened lazily on first playback.
pub struct RodioSink {
    tx: mpsc::Sender<SinkCommand>,
}

impl RodioSink {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || engine_loop(rx));
        Self { tx }
    }
}

impl Default for RodioSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for RodioSink {
    fn play(&mut self, audio: Bytes) -> Result<(), PlaybackError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(SinkCommand::Play {
                audio,
                reply: reply_tx,
            })
            .map_err(|_| PlaybackError::OutputClosed)?;
        reply_rx.recv().map_err(|_| PlaybackError::OutputClosed)?
    }

    fn stop(&mut self) {
        let _ = self.tx.send(SinkCommand::Stop);
    }
}

impl Drop for RodioSink {
    fn drop(&mut self) {
        let _ = self.tx.send(SinkCommand::Shutdown);
    }
}

fn engine_loop(rx: mpsc::Receiver<SinkCommand>) {
    let mut output: Option<OutputStream> = None;
    let mut sink: Option<Sink> = None;

    while let Ok(command) = rx.recv() {
        match command {
            SinkCommand::Play { audio, reply } => {
                let result = start_stream(&mut output, &mut sink, audio);
                let _ = reply.send(result);
            }
            SinkCommand::Stop => {
                if let Some(sink) = sink.take() {
                    sink.stop();
                }
            }
            SinkCommand::Shutdown => break,
        }
    }
    debug!("audio engine thread exiting");
}

fn start_stream(
    output: &mut Option<OutputStream>,
    sink: &mut Option<Sink>,
    audio: Bytes,
) -> Result<(), PlaybackError> {
    if output.is_none() {
        *output = Some(
            OutputStreamBuilder::open_default_stream().map_err(PlaybackError::OutputFailed)?,
        );
    }
    let stream = output.as_ref().ok_or(PlaybackError::OutputClosed)?;

    // Replacing the Sink tears down whatever was audible
    if let Some(previous) = sink.take() {
        previous.stop();
    }

    let decoder = Decoder::new(Cursor::new(audio)).map_err(PlaybackError::DecodeFailed)?;
    let new_sink = Sink::connect_new(stream.mixer());
    new_sink.append(decoder);
    new_sink.play();
    *sink = Some(new_sink);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use async_trait::async_trait;

    use crate::http::{ByteStream, HttpResponse};
    use crate::progress::{NoopReporter, ProgressReporter};

    fn episode(title: &str, audio_url: &str) -> Episode {
        Episode {
            title: title.to_string(),
            audio_url: audio_url.to_string(),
            description: String::new(),
            chapters: Vec::new(),
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum SinkEvent {
        Play(String),
        Stop,
    }

    /// Sink that records calls and models the single active stream
    #[derive(Clone, Default)]
    struct RecordingSink {
        events: Arc<Mutex<Vec<SinkEvent>>>,
        current: Arc<Mutex<Option<String>>>,
    }

    impl AudioSink for RecordingSink {
        fn play(&mut self, audio: Bytes) -> Result<(), PlaybackError> {
            let tag = String::from_utf8_lossy(&audio).into_owned();
            self.events.lock().push(SinkEvent::Play(tag.clone()));
            *self.current.lock() = Some(tag);
            Ok(())
        }

        fn stop(&mut self) {
            self.events.lock().push(SinkEvent::Stop);
            *self.current.lock() = None;
        }
    }

    #[derive(Clone)]
    struct MockAudioClient {
        responses: Arc<HashMap<String, Vec<u8>>>,
        status: u16,
    }

    impl MockAudioClient {
        fn new(responses: &[(&str, &str)]) -> Self {
            Self {
                responses: Arc::new(
                    responses
                        .iter()
                        .map(|(url, body)| (url.to_string(), body.as_bytes().to_vec()))
                        .collect(),
                ),
                status: 200,
            }
        }
    }

    #[async_trait]
    impl HttpClient for MockAudioClient {
        async fn get_bytes(&self, _url: &str) -> Result<Bytes, reqwest::Error> {
            Ok(Bytes::new())
        }

        async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
            let data = Bytes::from(self.responses.get(url).cloned().unwrap_or_default());
            let len = data.len() as u64;
            let stream: ByteStream = Box::pin(futures::stream::once(async move { Ok(data) }));

            Ok(HttpResponse {
                status: self.status,
                content_length: Some(len),
                body: stream,
            })
        }
    }

    /// Reporter that collects events for assertions
    #[derive(Clone, Default)]
    struct CollectingReporter {
        events: Arc<Mutex<Vec<ProgressEvent>>>,
    }

    impl ProgressReporter for CollectingReporter {
        fn report(&self, event: ProgressEvent) {
            self.events.lock().push(event);
        }
    }

    #[tokio::test]
    async fn play_prepares_and_starts_the_stream() {
        let client = MockAudioClient::new(&[("https://example.com/a.mp3", "audio-a")]);
        let sink = RecordingSink::default();
        let sink_view = sink.clone();
        let mut player = Player::new(client, sink, NoopReporter::shared());
        let mut state = player.state();

        player
            .play(&episode("A", "https://example.com/a.mp3"))
            .unwrap();

        state
            .wait_for(|s| matches!(s, PlaybackState::Playing { .. }))
            .await
            .unwrap();

        assert_eq!(*sink_view.current.lock(), Some("audio-a".to_string()));
    }

    #[tokio::test]
    async fn starting_b_while_a_plays_leaves_exactly_one_session() {
        let client = MockAudioClient::new(&[
            ("https://example.com/a.mp3", "audio-a"),
            ("https://example.com/b.mp3", "audio-b"),
        ]);
        let sink = RecordingSink::default();
        let sink_view = sink.clone();
        let mut player = Player::new(client, sink, NoopReporter::shared());
        let mut state = player.state();

        player
            .play(&episode("A", "https://example.com/a.mp3"))
            .unwrap();
        state
            .wait_for(|s| matches!(s, PlaybackState::Playing { episode_title } if episode_title == "A"))
            .await
            .unwrap();

        player
            .play(&episode("B", "https://example.com/b.mp3"))
            .unwrap();
        state
            .wait_for(|s| matches!(s, PlaybackState::Playing { episode_title } if episode_title == "B"))
            .await
            .unwrap();

        // B is the only live stream, and A was stopped before B started
        assert_eq!(*sink_view.current.lock(), Some("audio-b".to_string()));
        let events = sink_view.events.lock().clone();
        let plays: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Play(_)))
            .collect();
        assert_eq!(plays.len(), 2);
        assert_eq!(events.last(), Some(&SinkEvent::Play("audio-b".to_string())));
    }

    #[tokio::test]
    async fn episode_without_audio_fails_fast() {
        let client = MockAudioClient::new(&[]);
        let sink = RecordingSink::default();
        let sink_view = sink.clone();
        let mut player = Player::new(client, sink, NoopReporter::shared());

        let error = player.play(&episode("Silent", "")).unwrap_err();

        assert!(matches!(error, PlaybackError::NoAudio { .. }));
        assert!(sink_view.events.lock().is_empty());
    }

    #[tokio::test]
    async fn invalid_audio_url_fails_fast() {
        let client = MockAudioClient::new(&[]);
        let mut player = Player::new(client, RecordingSink::default(), NoopReporter::shared());

        let error = player.play(&episode("Bad", "not a url")).unwrap_err();
        assert!(matches!(error, PlaybackError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn http_failure_is_published_as_failed_state() {
        let mut client = MockAudioClient::new(&[("https://example.com/a.mp3", "audio-a")]);
        client.status = 404;

        let reporter = CollectingReporter::default();
        let reporter_view = reporter.clone();
        let mut player = Player::new(client, RecordingSink::default(), Arc::new(reporter));
        let mut state = player.state();

        player
            .play(&episode("A", "https://example.com/a.mp3"))
            .unwrap();

        state
            .wait_for(|s| matches!(s, PlaybackState::Failed { .. }))
            .await
            .unwrap();

        let events = reporter_view.events.lock().clone();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ProgressEvent::PlaybackFailed { .. }))
        );
    }

    #[test]
    fn superseded_outcome_is_never_published() {
        let generations = AtomicU64::new(1);
        let (state_tx, state_rx) = watch::channel(PlaybackState::Idle);
        let reporter = CollectingReporter::default();
        let reporter_view = reporter.clone();
        let shared: SharedProgressReporter = Arc::new(reporter);

        // A later play()/stop() bumped the generation while the sink lock
        // was already released
        generations.store(2, Ordering::SeqCst);

        publish_outcome(&generations, 1, &state_tx, &shared, "A", Ok(()));
        assert_eq!(*state_rx.borrow(), PlaybackState::Idle);
        assert!(reporter_view.events.lock().is_empty());

        // Stale failures are equally discarded
        publish_outcome(
            &generations,
            1,
            &state_tx,
            &shared,
            "A",
            Err(PlaybackError::HttpStatus {
                url: "https://example.com/a.mp3".to_string(),
                status: 500,
            }),
        );
        assert_eq!(*state_rx.borrow(), PlaybackState::Idle);
        assert!(reporter_view.events.lock().is_empty());

        // The current generation publishes normally
        publish_outcome(&generations, 2, &state_tx, &shared, "B", Ok(()));
        assert!(matches!(
            &*state_rx.borrow(),
            PlaybackState::Playing { episode_title } if episode_title == "B"
        ));
    }

    #[tokio::test]
    async fn stop_tears_down_the_session() {
        let client = MockAudioClient::new(&[("https://example.com/a.mp3", "audio-a")]);
        let sink = RecordingSink::default();
        let sink_view = sink.clone();
        let mut player = Player::new(client, sink, NoopReporter::shared());
        let mut state = player.state();

        player
            .play(&episode("A", "https://example.com/a.mp3"))
            .unwrap();
        state
            .wait_for(|s| matches!(s, PlaybackState::Playing { .. }))
            .await
            .unwrap();

        player.stop();

        assert_eq!(*sink_view.current.lock(), None);
        assert_eq!(*state.borrow(), PlaybackState::Idle);
    }
}
