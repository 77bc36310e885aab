use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use podplay::{
    Episode, NoopReporter, Player, ProgressEvent, ProgressReporter, ReqwestClient, RodioSink,
    SharedProgressReporter, load_feed,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");

/// Fetch a podcast RSS feed, list its episodes, and stream the one you pick
#[derive(Parser, Debug)]
#[command(name = "podplay")]
#[command(about = "Fetch a podcast RSS feed and stream episodes from your terminal")]
#[command(version)]
struct Args {
    /// RSS feed URL or path to a local RSS file
    #[arg(default_value = "https://feeds.podnews.net/podcast.xml")]
    feed: String,

    /// Maximum number of episodes to list
    #[arg(short, long)]
    limit: Option<usize>,

    /// Print the parsed episode list as JSON and exit
    #[arg(long)]
    json: bool,

    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

/// Progress reporter using indicatif for the fetch phase and plain styled
/// lines for playback events
struct TerminalReporter {
    spinner: ProgressBar,
}

impl TerminalReporter {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {wide_msg}")
                .unwrap(),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { spinner }
    }
}

impl ProgressReporter for TerminalReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingFeed { url } => {
                self.spinner
                    .set_message(format!("{SEARCH}Fetching feed: {}", url.cyan()));
            }

            ProgressEvent::FeedLoaded { episode_count } => {
                self.spinner.finish_and_clear();
                println!(
                    "{HEADPHONES}{} episodes loaded",
                    episode_count.to_string().cyan()
                );
            }

            ProgressEvent::PreparingPlayback { episode_title } => {
                println!("{SEARCH}Preparing: {}", episode_title.dimmed());
            }

            ProgressEvent::PlaybackStarted { episode_title } => {
                println!("{SUCCESS}Playing: {}", episode_title.green().bold());
            }

            ProgressEvent::PlaybackFailed {
                episode_title,
                error,
            } => {
                println!(
                    "{FAILURE}{} - {}",
                    episode_title.red(),
                    error.to_string().dimmed()
                );
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if !args.quiet && !args.json {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podplay".bold().magenta(),
            "- Podcast Player".dimmed()
        );
    }

    let client = ReqwestClient::new();

    let reporter: SharedProgressReporter = if args.quiet || args.json {
        NoopReporter::shared()
    } else {
        Arc::new(TerminalReporter::new())
    };

    reporter.report(ProgressEvent::FetchingFeed {
        url: args.feed.clone(),
    });

    let mut episodes = load_feed(&client, &args.feed)
        .await
        .context("Failed to load feed")?;
    if let Some(limit) = args.limit {
        episodes.truncate(limit);
    }

    reporter.report(ProgressEvent::FeedLoaded {
        episode_count: episodes.len(),
    });

    if args.json {
        println!("{}", serde_json::to_string_pretty(&episodes)?);
        return Ok(());
    }

    if episodes.is_empty() {
        println!("{FAILURE}{}", "The feed contains no episodes".yellow());
        return Ok(());
    }

    print_episode_list(&episodes);

    let mut player = Player::new(client, RodioSink::new(), reporter);

    let stdin = std::io::stdin();
    loop {
        print!(
            "\n{} ",
            format!(
                "Episode [1-{}], 'l' to list, 's' to stop, 'q' to quit:",
                episodes.len()
            )
            .bold()
        );
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let input = line.trim();

        match input {
            "" => {}
            "q" | "quit" => break,
            "l" | "list" => print_episode_list(&episodes),
            "s" | "stop" => player.stop(),
            _ => match input.parse::<usize>() {
                Ok(n) if (1..=episodes.len()).contains(&n) => {
                    let episode = &episodes[n - 1];
                    show_description(episode);
                    if let Err(e) = player.play(episode) {
                        println!("{FAILURE}{}", e.to_string().red());
                    }
                }
                _ => println!("{FAILURE}{}", format!("No such episode: {input}").yellow()),
            },
        }
    }

    Ok(())
}

fn print_episode_list(episodes: &[Episode]) {
    println!();
    for (index, episode) in episodes.iter().enumerate() {
        let number = format!("{:>3}", index + 1);
        let title = display_title(episode);
        if episode.has_audio() {
            println!("  {} {}", number.cyan(), title);
        } else {
            println!("  {} {} {}", number.cyan(), title.dimmed(), "(no audio)".yellow());
        }
    }
}

fn display_title(episode: &Episode) -> String {
    if episode.title.is_empty() {
        "(untitled)".to_string()
    } else {
        episode.title.clone()
    }
}

fn show_description(episode: &Episode) {
    if episode.description.is_empty() {
        return;
    }
    // Descriptions routinely carry HTML entities even inside CDATA
    let text = html_escape::decode_html_entities(&episode.description);
    println!("  {}", truncate(text.trim(), 200).dimmed());
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let prefix: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{prefix}...")
    }
}
