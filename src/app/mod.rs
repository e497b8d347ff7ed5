mod player;
mod render;


use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::catalog::{CachedCatalog, CatalogClient, DandanCatalog};
use crate::cli::{CacheAction, Cli, Command, MediaArgs, PlayArgs};
use crate::clock::{
    ClockSource, PlaybackPosition, PolledClock, Renderer, SessionStats, drive, push_clock,
};
use crate::comment::CommentIndex;
use crate::config::Config;
use crate::db::CommentCache;
use crate::paths::{cache_database_path, settings_file_path};
use crate::resolver::{MediaItem, resolve};
use crate::scheduler::Scheduler;
use crate::settings::{DanmakuSettings, SharedSettings};

use self::player::SimulatedPlayer;
use self::render::{PrintRenderer, format_timestamp, truncate};

const PUSH_INTERVAL: Duration = Duration::from_millis(40);

pub fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env();
    if let Some(base) = cli.api_base {
        config.api_base = base;
    }

    match cli.command {
        Command::Resolve(args) => run_resolve(&open_catalog(&config, cli.no_cache), &args)?,
        Command::Comments { episode_id } => {
            run_comments(&open_catalog(&config, cli.no_cache), episode_id)?
        }
        Command::Play(args) => run_play(&config, &open_catalog(&config, cli.no_cache), &args)?,
        Command::Cache { action } => run_cache(action)?,
    }

    Ok(())
}

fn open_catalog(config: &Config, no_cache: bool) -> CachedCatalog<DandanCatalog> {
    let cache = if no_cache {
        None
    } else {
        match open_cache() {
            Ok(cache) => Some(cache),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "comment cache unavailable");
                None
            }
        }
    };
    CachedCatalog::new(
        DandanCatalog::from_config(config),
        cache,
        config.cache_max_age,
    )
}

fn open_cache() -> Result<CommentCache> {
    let cache = CommentCache::open(&cache_database_path()?)?;
    cache.migrate()?;
    Ok(cache)
}

fn media_item(
    series: &str,
    original_title: Option<&str>,
    season: u32,
    episode: Option<u32>,
) -> MediaItem {
    let mut item = MediaItem::new(series).with_season(season);
    if let Some(title) = original_title {
        item = item.with_original_title(title);
    }
    if let Some(episode) = episode {
        item = item.with_episode(episode);
    }
    item
}

fn run_resolve<C: CatalogClient>(catalog: &C, args: &MediaArgs) -> Result<()> {
    let item = media_item(
        &args.series,
        args.original_title.as_deref(),
        args.season,
        args.episode,
    );
    match resolve(catalog, &item).context("episode resolution failed")? {
        Some(found) => {
            println!("Resolved episode:");
            println!(
                "  Series: {} [{}] (id {})",
                found.series_title, found.series_type, found.series_id
            );
            println!("  Episode: {}", found.episode_title);
            println!("  Episode id: {}", found.episode_id);
        }
        None => println!("No catalog match for {}. Overlay unavailable.", item.series_name),
    }
    Ok(())
}

fn load_index<C: CatalogClient>(catalog: &C, episode_id: i64) -> Result<CommentIndex> {
    let raw = catalog
        .fetch_comments(episode_id)
        .with_context(|| format!("failed to fetch comments for episode {episode_id}"))?;
    Ok(CommentIndex::decode(&raw))
}

fn run_comments<C: CatalogClient>(catalog: &C, episode_id: i64) -> Result<()> {
    let index = load_index(catalog, episode_id)?;
    println!("{}", describe_index(episode_id, &index));
    Ok(())
}

fn describe_index(episode_id: i64, index: &CommentIndex) -> String {
    let mut lines = vec![
        format!("Episode {episode_id}"),
        format!("  Comments indexed: {}", index.len()),
        format!("  Dropped while decoding: {}", index.dropped()),
        format!("  Seconds with comments: {}", index.bucket_count()),
    ];
    if let Some((second, count)) = index.busiest_bucket() {
        lines.push(format!(
            "  Busiest second: {} ({count} comments)",
            format_timestamp(second as f64)
        ));
    }
    if let Some(last) = index.last_second() {
        lines.push(format!("  Last comment at: {}", format_timestamp(last as f64)));
    }
    lines.join("\n")
}

fn load_settings(args: &PlayArgs) -> Result<DanmakuSettings> {
    let explicit = args.settings.is_some();
    let path = match &args.settings {
        Some(path) => path.clone(),
        None => settings_file_path().unwrap_or_else(|_| PathBuf::from("settings.json")),
    };

    if explicit || path.exists() {
        DanmakuSettings::load(&path)
    } else {
        Ok(DanmakuSettings::default())
    }
}

fn apply_overrides(settings: &mut DanmakuSettings, args: &PlayArgs) {
    if let Some(density) = args.density {
        settings.density_limit = density;
    }
    if let Some(offset) = args.offset {
        settings.cur_ep_offset = offset;
    }
    if let Some(filter) = args.author_filter {
        settings.danmaku_filter = filter;
    }
    if let Some(filter) = args.mode_filter {
        settings.mode_filter = filter;
    }
}

fn run_play<C: CatalogClient>(config: &Config, catalog: &C, args: &PlayArgs) -> Result<()> {
    let settings = SharedSettings::new(load_settings(args)?);
    settings.update(|settings| apply_overrides(settings, args));

    let episode_id = match (args.episode_id, args.series.as_deref()) {
        (Some(episode_id), _) => episode_id,
        (None, Some(series)) => {
            let item = media_item(
                series,
                args.original_title.as_deref(),
                args.season,
                args.episode,
            );
            match resolve(catalog, &item).context("episode resolution failed")? {
                Some(found) => {
                    println!(
                        "Playing {} | {} (episode id {})",
                        truncate(&found.series_title, 40),
                        truncate(&found.episode_title, 40),
                        found.episode_id
                    );
                    found.episode_id
                }
                None => {
                    println!("No catalog match for {series}. Overlay unavailable.");
                    return Ok(());
                }
            }
        }
        (None, None) => anyhow::bail!("either --episode-id or --series is required"),
    };

    let index = match load_index(catalog, episode_id) {
        Ok(index) => index,
        Err(err) => {
            println!("Comment fetch failed: {err:#}. Overlay unavailable.");
            return Ok(());
        }
    };
    println!("{}", describe_index(episode_id, &index));
    if index.is_empty() {
        println!("No comments for this episode. The overlay stays empty.");
    }

    let mut scheduler = Scheduler::new(settings, config.scheduler);
    scheduler.load(index);
    debug!(phase = ?scheduler.phase(), "scheduler loaded");

    let player = Arc::new(SimulatedPlayer::start(
        args.from,
        args.rate,
        args.duration,
        args.seek_at,
    ));
    let visible_for = Duration::try_from_secs_f64(args.visible_secs).unwrap_or(Duration::ZERO);
    let mut renderer = PrintRenderer::new(io::stdout(), visible_for);

    let stats = if args.push {
        run_push_session(&mut scheduler, player, &mut renderer)?
    } else {
        let interval = args
            .poll_ms
            .map(Duration::from_millis)
            .unwrap_or(config.poll_interval);
        let mut clock = PolledClock::spawn(player, interval)?;
        let stats = drive(&mut scheduler, &clock, &mut renderer);
        clock.stop();
        stats
    };

    println!(
        "Session finished: {} samples, {} shown, {} expired, {} finished on screen",
        stats.samples, stats.activated, stats.expired, stats.released
    );
    if let Some(second) = scheduler.last_observed_second() {
        println!("  Last position: {}", format_timestamp(second as f64));
    }
    let still_active = scheduler.active_count();
    let cleared = scheduler.unload();
    debug!(still_active, cleared = cleared.len(), phase = ?scheduler.phase(), "overlay unloaded");
    Ok(())
}

fn run_push_session<R: Renderer>(
    scheduler: &mut Scheduler,
    player: Arc<SimulatedPlayer>,
    renderer: &mut R,
) -> Result<SessionStats> {
    let (publisher, clock) = push_clock();
    let producer = thread::Builder::new()
        .name("danmaku-push".to_string())
        .spawn(move || {
            while let Some(position) = player.position_secs() {
                if !publisher.publish(position) {
                    break;
                }
                thread::sleep(PUSH_INTERVAL);
            }
        })
        .context("failed to spawn push clock producer")?;

    let stats = drive(scheduler, &clock, renderer);
    let _ = producer.join();
    Ok(stats)
}

fn run_cache(action: CacheAction) -> Result<()> {
    let cache = open_cache()?;
    match action {
        CacheAction::List => {
            let entries = cache.list()?;
            if entries.is_empty() {
                println!("Comment cache is empty.");
                return Ok(());
            }
            println!("{:<14} {:<10} {:<32}", "EPISODE", "COMMENTS", "FETCHED AT");
            for entry in entries {
                println!(
                    "{:<14} {:<10} {:<32}",
                    entry.episode_id, entry.comment_count, entry.fetched_at
                );
            }
        }
        CacheAction::Clear => {
            let removed = cache.clear()?;
            println!("Removed {removed} cached episode(s).");
        }
    }
    Ok(())
}
