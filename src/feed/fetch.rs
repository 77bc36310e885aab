// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use bytes::Bytes;
use url::Url;

use crate::error::FeedError;
use crate::http::HttpClient;

use super::parse::{Episode, parse_feed};

/// Fetch raw feed bytes from a URL (without parsing)
pub async fn fetch_feed_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes, FeedError> {
    let bytes = client
        .get_bytes(url)
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })?;
    Ok(bytes)
}

/// Fetch a podcast feed from a URL and parse it into episodes
pub async fn fetch_episodes<C: HttpClient>(
    client: &C,
    url: &str,
) -> Result<Vec<Episode>, FeedError> {
    Url::parse(url)?;
    let bytes = fetch_feed_bytes(client, url).await?;
    Ok(parse_feed(&bytes)?)
}

/// Parse a podcast feed from a local file
pub fn parse_feed_file(path: &Path) -> Result<Vec<Episode>, FeedError> {
    let bytes = std::fs::read(path).map_err(|e| FeedError::FileReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(parse_feed(&bytes)?)
}

/// Load episodes from either a feed URL or a local file path
pub async fn load_feed<C: HttpClient>(
    client: &C,
    source: &str,
) -> Result<Vec<Episode>, FeedError> {
    if is_url(source) {
        fetch_episodes(client, source).await
    } else {
        parse_feed_file(Path::new(source))
    }
}

/// Determine if a string is a URL or a file path
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}
