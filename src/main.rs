use reelcache::cli::Args;
use reelcache::config::{CacheSettings, PathConfig};
use reelcache::core::{CacheEvent, Direction, FrameCache, FrameRange};
use reelcache::entities::{FrameResolution, FrameStore, MissingFramePolicy, SyntheticMedia, Track};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Counters collected while playing
#[derive(Debug, Default)]
struct PlaybackStats {
    shown: usize,
    hits: usize,
    misses: usize,
    black: usize,
    errors: usize,
    cached: usize,
    evicted: usize,
    clears: usize,
    media_changes: usize,
}

impl PlaybackStats {
    fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }

    fn drain(&mut self, events: &Receiver<CacheEvent>) {
        for event in events.try_iter() {
            match event {
                CacheEvent::FrameCached(_) => self.cached += 1,
                CacheEvent::FrameEvicted(_) => self.evicted += 1,
                CacheEvent::Cleared => self.clears += 1,
            }
        }
    }
}

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| path_config.log_file());

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// Clips of identical length, appended end to end with `gap` empty frames between them.
fn build_track(args: &Args) -> Track {
    let mut track = Track::new("V1");
    let (width, height) = (args.size[0].max(1), args.size[1].max(1));
    let mut start = 0;
    for i in 0..args.clips.max(1) {
        let media: Arc<dyn FrameStore> = Arc::new(
            SyntheticMedia::new(
                format!("clip{:02}", i + 1),
                args.first_frame,
                args.last_frame,
                width,
                height,
            )
            .with_decode_delay(Duration::from_millis(args.decode_ms)),
        );
        let duration = media.duration().max(1);
        if track.insert(media, start).is_none() {
            warn!("Clip {} not placed at {}", i + 1, start);
        }
        start += duration + args.gap.max(0);
    }
    track
}

fn play(args: &Args, settings: &CacheSettings) -> Result<PlaybackStats> {
    let track = build_track(args);
    let (track_start, track_end) = track.range().context("Track is empty")?;
    let span = FrameRange::new(track_start, track_end);
    info!(
        "Track '{}': {} clips, frames {}..{}",
        track.name,
        track.len(),
        track_start,
        track_end
    );

    let (cache, events) = FrameCache::new(settings);
    let direction: Direction = args.direction.into();
    let policy: MissingFramePolicy = args.gap_policy.into();
    cache.set_direction(direction);

    let frame_time = Duration::from_secs_f64(1.0 / args.fps.max(1.0));
    let mut pos = if direction.is_backward() { track_end } else { track_start };
    let mut current: Option<Uuid> = None;
    let mut stats = PlaybackStats::default();

    for n in 0..args.frames {
        let tick = Instant::now();
        if n == args.frames / 2 {
            if let Some(seek) = args.seek {
                pos = seek.clamp(track_start, track_end);
                info!("Seek to {}", pos);
            }
        }

        match track.resolve(pos, policy) {
            FrameResolution::Frame { item, frame } => {
                if current != Some(item.instance_uuid) {
                    debug!("Media change at {}: {:?}", pos, item);
                    cache.set_media(item.media());
                    cache.start_playback_cache(direction);
                    current = Some(item.instance_uuid);
                    stats.media_changes += 1;
                }
                cache.set_current_frame(frame);
                if cache.is_resident(frame) && item.media().has_frame(frame) {
                    stats.hits += 1;
                } else {
                    stats.misses += 1;
                    cache.ensure_cached(frame);
                }
                stats.shown += 1;
            }
            FrameResolution::Black => stats.black += 1,
            FrameResolution::Error => {
                warn!("No frame at {}", pos);
                stats.errors += 1;
            }
        }

        stats.drain(&events);
        if let Some(rest) = frame_time.checked_sub(tick.elapsed()) {
            thread::sleep(rest);
        }
        pos = if direction.is_backward() { span.prev(pos) } else { span.next(pos) };
    }

    cache.stop_playback_cache();
    cache.wait_idle();
    stats.drain(&events);

    let mem = cache.memory();
    println!(
        "Resident: {} frames, {} / {} MB ({:.1}%)",
        cache.resident_count(),
        mem.used_bytes / 1024 / 1024,
        mem.max_bytes / 1024 / 1024,
        mem.usage_fraction() * 100.0
    );
    Ok(stats)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = path_config.ensure_dir() {
        eprintln!("Warning: Failed to create application directories: {:#}", e);
    }

    init_logging(&args, &path_config)?;
    info!("reelcache starting...");
    debug!("Command-line args: {:?}", args);

    let settings_path = path_config.settings_file();
    info!("Config path: {}", settings_path.display());

    let mut settings = CacheSettings::load_or_default(&settings_path);
    if let Some(mb) = args.mem_mb {
        settings.cache_memory_gb = mb as f64 / 1024.0;
    }
    if let Some(workers) = args.workers {
        settings.max_threads = workers;
    }
    settings.default_direction = args.direction.into();

    if args.save_settings {
        settings.save(&settings_path)?;
        println!("Settings saved to {}", settings_path.display());
    }

    let stats = play(&args, &settings)?;
    println!(
        "Played {} frames: {} hits, {} misses ({:.1}% hit rate), {} black, {} errors",
        stats.shown + stats.black + stats.errors,
        stats.hits,
        stats.misses,
        stats.hit_rate() * 100.0,
        stats.black,
        stats.errors
    );
    println!(
        "Cache events: {} cached, {} evicted, {} clears, {} media changes",
        stats.cached, stats.evicted, stats.clears, stats.media_changes
    );
    Ok(())
}
