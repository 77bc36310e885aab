mod fetch;
mod parse;

pub use fetch::{fetch_episodes, is_url, load_feed, parse_feed_file};
pub use parse::{Episode, parse_feed, parse_feed_lossy};
