use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "danmaku-sync",
    version,
    about = "Resolve, fetch and schedule danmaku comments against a playback clock"
)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Comment catalog base URL (overrides DANMAKU_API_BASE)
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    /// Skip the local comment cache
    #[arg(long, global = true)]
    pub no_cache: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve a media item to a catalog episode
    Resolve(MediaArgs),
    /// Fetch and index the comments of a catalog episode
    Comments { episode_id: i64 },
    /// Run a simulated playback session with the overlay scheduler
    Play(PlayArgs),
    /// Inspect or clear the comment cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Debug, Args)]
pub struct MediaArgs {
    /// Series name as known to the local library
    #[arg(long)]
    pub series: String,

    /// Original-language title, searched when the series name finds nothing
    #[arg(long)]
    pub original_title: Option<String>,

    /// 1-based season number
    #[arg(long, default_value_t = 1)]
    pub season: u32,

    /// 1-based episode number
    #[arg(long)]
    pub episode: Option<u32>,
}

#[derive(Debug, Args)]
pub struct PlayArgs {
    /// Catalog episode id; skips resolution
    #[arg(long, conflicts_with = "series")]
    pub episode_id: Option<i64>,

    #[arg(long, required_unless_present = "episode_id")]
    pub series: Option<String>,

    #[arg(long)]
    pub original_title: Option<String>,

    #[arg(long, default_value_t = 1)]
    pub season: u32,

    #[arg(long)]
    pub episode: Option<u32>,

    /// Playback start position in seconds
    #[arg(long, default_value_t = 0.0)]
    pub from: f64,

    /// Playback rate
    #[arg(long, default_value_t = 1.0)]
    pub rate: f64,

    /// Media seconds to play before the session ends
    #[arg(long, default_value_t = 30.0)]
    pub duration: f64,

    /// Seek once during playback, as `<at>:<to>` media seconds
    #[arg(long, value_parser = parse_seek)]
    pub seek_at: Option<(f64, f64)>,

    /// Feed the scheduler through the push clock instead of the polling timer
    #[arg(long)]
    pub push: bool,

    /// Polling interval of the fallback clock in milliseconds (overrides DANMAKU_POLL_MS)
    #[arg(long)]
    pub poll_ms: Option<u64>,

    /// Seconds a comment stays on screen in the printing renderer
    #[arg(long, default_value_t = 8.0)]
    pub visible_secs: f64,

    /// Settings JSON file (defaults to the config directory's settings.json)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Override the per-second density limit
    #[arg(long)]
    pub density: Option<i64>,

    /// Override the manual time offset in seconds
    #[arg(long, allow_hyphen_values = true)]
    pub offset: Option<f64>,

    /// Override the excluded-author bitmask
    #[arg(long)]
    pub author_filter: Option<u8>,

    /// Override the excluded-mode bitmask
    #[arg(long)]
    pub mode_filter: Option<u8>,
}

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    List,
    Clear,
}

fn parse_seek(raw: &str) -> Result<(f64, f64), String> {
    let (at, to) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected <at>:<to>, got `{raw}`"))?;
    let at = at
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("invalid seek position `{at}`: {err}"))?;
    let to = to
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("invalid seek target `{to}`: {err}"))?;
    Ok((at, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_argument_parses_both_positions() {
        assert_eq!(parse_seek("12.5:3"), Ok((12.5, 3.0)));
        assert!(parse_seek("12").is_err());
        assert!(parse_seek("a:b").is_err());
    }

    #[test]
    fn play_accepts_episode_id_without_series() {
        let cli = Cli::try_parse_from([
            "danmaku-sync",
            "play",
            "--episode-id",
            "1010002",
            "--offset",
            "-2",
            "--push",
        ])
        .expect("valid arguments");

        let Command::Play(args) = cli.command else {
            panic!("expected play command");
        };
        assert_eq!(args.episode_id, Some(1010002));
        assert_eq!(args.offset, Some(-2.0));
        assert!(args.push);
    }

    #[test]
    fn play_requires_series_or_episode_id() {
        assert!(Cli::try_parse_from(["danmaku-sync", "play"]).is_err());
    }
}
