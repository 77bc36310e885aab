// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;

use crate::error::ParseError;

/// Represents a single podcast episode, one per `<item>` in the feed.
///
/// All fields default to empty when the corresponding element or attribute
/// is missing; there is no required-field validation.
#[derive(Debug, Clone, Serialize)]
pub struct Episode {
    pub title: String,
    pub audio_url: String,
    pub description: String,
    /// Always empty: `podcast:chapters` references an external chapters
    /// document which is never fetched.
    pub chapters: Vec<String>,
}

impl Episode {
    /// Whether the item carried an `<enclosure url="...">`
    pub fn has_audio(&self) -> bool {
        !self.audio_url.is_empty()
    }
}

/// Which captured text field an open direct-child element feeds into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextField {
    Title,
    Description,
}

/// Scan state for the `<item>` element currently being walked.
///
/// `depth` counts open elements below `<item>`; captures only happen for
/// direct children (depth 0 at the start tag), so a `title` nested inside
/// some other item child cannot overwrite the episode title. The first
/// occurrence of each field wins.
#[derive(Debug, Default)]
struct ItemScan {
    depth: usize,
    title: Option<String>,
    description: Option<String>,
    audio_url: Option<String>,
    capture: Option<(TextField, String)>,
}

impl ItemScan {
    /// Inspect a direct child's start tag and begin a capture if it is the
    /// first occurrence of a field we track.
    fn open_child(&mut self, e: &BytesStart<'_>) -> Result<(), quick_xml::Error> {
        match e.name().as_ref() {
            b"title" if self.title.is_none() => {
                self.capture = Some((TextField::Title, String::new()));
            }
            b"description" if self.description.is_none() => {
                self.capture = Some((TextField::Description, String::new()));
            }
            b"enclosure" if self.audio_url.is_none() => {
                if let Some(attr) = e.try_get_attribute("url")? {
                    self.audio_url = Some(attr.unescape_value()?.into_owned());
                }
            }
            // The chapters document lives behind a URL; its content is
            // never extracted, so episodes keep an empty chapter list.
            b"podcast:chapters" => {}
            _ => {}
        }
        Ok(())
    }

    fn push_text(&mut self, text: &str) {
        // Only text directly inside the captured child counts
        if self.depth == 1 {
            if let Some((_, buffer)) = self.capture.as_mut() {
                buffer.push_str(text);
            }
        }
    }

    fn close_capture(&mut self) {
        if let Some((field, text)) = self.capture.take() {
            let text = text.trim().to_string();
            match field {
                TextField::Title => self.title = Some(text),
                TextField::Description => self.description = Some(text),
            }
        }
    }

    fn finish(self) -> Episode {
        Episode {
            title: self.title.unwrap_or_default(),
            audio_url: self.audio_url.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            chapters: Vec::new(),
        }
    }
}

/// Parse RSS feed XML into episodes, in document order.
///
/// Fails with [`ParseError`] on the first XML error; use
/// [`parse_feed_lossy`] to keep the prefix parsed before the error.
pub fn parse_feed(xml_bytes: &[u8]) -> Result<Vec<Episode>, ParseError> {
    let (episodes, error) = scan_feed(xml_bytes);
    match error {
        Some(e) => Err(e),
        None => Ok(episodes),
    }
}

/// Lenient variant: returns the episodes from items fully closed before the
/// first XML error, discarding any partially-scanned item. A well-formed
/// feed parses identically to [`parse_feed`].
pub fn parse_feed_lossy(xml_bytes: &[u8]) -> Vec<Episode> {
    let (episodes, error) = scan_feed(xml_bytes);
    if let Some(e) = error {
        tracing::warn!("feed scan stopped early: {e}");
    }
    episodes
}

/// Linear scan over XML events. Stops at the first error, returning the
/// episodes emitted so far alongside it.
fn scan_feed(xml_bytes: &[u8]) -> (Vec<Episode>, Option<ParseError>) {
    let mut reader = Reader::from_reader(xml_bytes);
    reader.config_mut().trim_text(true);

    let mut episodes = Vec::new();
    let mut item: Option<ItemScan> = None;
    let mut buf = Vec::new();

    loop {
        let result = match reader.read_event_into(&mut buf) {
            Ok(event) => handle_event(event, &mut item, &mut episodes),
            Err(e) => Err(e),
        };

        match result {
            Ok(Walk::Continue) => buf.clear(),
            Ok(Walk::Done) => return (episodes, None),
            Err(source) => {
                let error = ParseError {
                    position: reader.buffer_position(),
                    items_parsed: episodes.len(),
                    source,
                };
                return (episodes, Some(error));
            }
        }
    }
}

enum Walk {
    Continue,
    Done,
}

fn handle_event(
    event: Event<'_>,
    item: &mut Option<ItemScan>,
    episodes: &mut Vec<Episode>,
) -> Result<Walk, quick_xml::Error> {
    match event {
        Event::Eof => return Ok(Walk::Done),

        Event::Start(e) => match item.as_mut() {
            None => {
                if e.name().as_ref() == b"item" {
                    *item = Some(ItemScan::default());
                }
            }
            Some(scan) => {
                if scan.depth == 0 {
                    scan.open_child(&e)?;
                }
                scan.depth += 1;
            }
        },

        // Self-closing tags (the usual shape of <enclosure/>) open and
        // close a direct child in one event
        Event::Empty(e) => {
            if let Some(scan) = item.as_mut() {
                if scan.depth == 0 {
                    scan.open_child(&e)?;
                    scan.close_capture();
                }
            } else if e.name().as_ref() == b"item" {
                // <item/> opens and closes in one event; it still counts
                // as one (all-empty) episode
                episodes.push(ItemScan::default().finish());
            }
        }

        Event::End(_) => {
            let item_closed = matches!(item.as_ref(), Some(scan) if scan.depth == 0);
            if item_closed {
                if let Some(scan) = item.take() {
                    episodes.push(scan.finish());
                }
            } else if let Some(scan) = item.as_mut() {
                scan.depth -= 1;
                if scan.depth == 0 {
                    scan.close_capture();
                }
            }
        }

        Event::Text(e) => {
            if let Some(scan) = item.as_mut() {
                scan.push_text(&e.unescape()?);
            }
        }

        Event::CData(e) => {
            if let Some(scan) = item.as_mut() {
                scan.push_text(&String::from_utf8_lossy(&e.into_inner()));
            }
        }

        _ => {}
    }

    Ok(Walk::Continue)
}
