// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Synthetic load generator.
//!
//! Loads `evsync.toml`, feeds every configured stream with generated batches
//! in real time, keeps a surface consumer and a synchronizer busy, then
//! prints queue and delay statistics as JSON.

use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use evsync::observability::{debug_flags_help, parse_debug_flags};
use evsync::prelude::*;
use evsync::settings::EngineSettings;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::info;

/// One batch per millisecond of virtual time
const BATCH_TICKS: u32 = 12_500;

struct Args {
    config: Option<PathBuf>,
    seconds: f64,
    events_per_batch: usize,
    streams: Vec<String>,
}

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: stream_soak [--config <path>] [--seconds <n>] [--events <per batch>] \
         [--streams <a,b,...>] [--debug-<crate>]\n\n\
         Defaults:\n\
         - config: evsync.toml discovery\n\
         - seconds: 5\n\
         - events: 200\n\
         - streams: left,right\n\n{}",
        debug_flags_help()
    );
    process::exit(2);
}

fn parse_args() -> Args {
    let mut parsed = Args {
        config: None,
        seconds: 5.0,
        events_per_batch: 200,
        streams: vec!["left".to_string(), "right".to_string()],
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.config = Some(PathBuf::from(v));
            }
            "--seconds" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.seconds = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--events" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.events_per_batch = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--streams" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.streams = v
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
            "-h" | "--help" => usage_and_exit(),
            other if other.starts_with("--debug-") => {}
            other => {
                eprintln!("Unknown argument: {other}");
                usage_and_exit();
            }
        }
    }

    parsed
}

fn wall_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Seeded scatter of events over the sensor, one batch per call.
fn synth_batch(
    rng: &mut StdRng,
    start: Stamp,
    sequence: u64,
    count: usize,
    width: usize,
    height: usize,
    channels: usize,
) -> EventBatch {
    let mut events = Vec::with_capacity(count);
    for i in 0..count {
        let offset = (i as u64 * BATCH_TICKS as u64) / count.max(1) as u64;
        events.push(Event::new(
            rng.gen_range(0..width) as u16,
            rng.gen_range(0..height) as u16,
            rng.gen_range(0..channels) as u8,
            rng.gen_bool(0.5),
            start.wrapping_add(offset),
        ));
    }
    EventBatch::new(events, Some(ArrivalStamp::new(sequence, wall_seconds())))
}

fn spawn_producer(
    label: String,
    queue: BatchQueue,
    settings: &EngineSettings,
    events_per_batch: usize,
    running: Arc<AtomicBool>,
    seed: u64,
) -> Result<thread::JoinHandle<u64>> {
    let width = settings.surface.width;
    let height = settings.surface.height;
    let channels = settings.surface.channel_count;

    thread::Builder::new()
        .name(format!("soak-producer-{}", label))
        .spawn(move || {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut stamp = Stamp::ZERO;
            let mut sequence = 0u64;
            let started = Instant::now();
            while running.load(Ordering::Relaxed) {
                let batch = synth_batch(
                    &mut rng,
                    stamp,
                    sequence,
                    events_per_batch,
                    width,
                    height,
                    channels,
                );
                queue.push(batch);
                sequence += 1;
                stamp = stamp.wrapping_add(BATCH_TICKS as u64);

                // Pace to real time
                let target = Duration::from_millis(sequence);
                if let Some(wait) = target.checked_sub(started.elapsed()) {
                    thread::sleep(wait);
                }
            }
            sequence
        })
        .with_context(|| format!("Failed to spawn producer for '{}'", label))
}

fn main() -> Result<()> {
    let args = parse_args();
    let settings = EngineSettings::load(args.config.as_deref())
        .context("Failed to load evsync configuration")?;

    let debug_flags = parse_debug_flags();
    #[cfg(feature = "file-logging")]
    let _guard = match settings.logging.log_dir {
        Some(_) => Some(evsync::observability::init_logging(&debug_flags, &settings.logging)?),
        None => {
            evsync::observability::init_console_logging(&debug_flags, &settings.logging)?;
            None
        }
    };
    #[cfg(not(feature = "file-logging"))]
    let _console = evsync::observability::init_console_logging(&debug_flags, &settings.logging)?;

    info!(
        "[SOAK] {} stream(s), {} events per batch, {:.1}s",
        args.streams.len(),
        args.events_per_batch,
        args.seconds
    );

    let running = Arc::new(AtomicBool::new(true));
    let sync = StreamSynchronizer::new(settings.synchronizer.clone())?;
    let surface_queue = BatchQueue::named("surface", settings.queue_capacity);
    let mut surface = SurfaceConsumer::new(settings.surface.clone(), surface_queue.clone())?;
    surface.start()?;

    let mut producers = Vec::new();
    for (index, label) in args.streams.iter().enumerate() {
        let queue = sync.open(label)?;
        producers.push((
            label.clone(),
            spawn_producer(
                label.clone(),
                queue,
                &settings,
                args.events_per_batch,
                running.clone(),
                0x9E37_79B9_7F4A_7C15 ^ index as u64,
            )?,
        ));
    }
    producers.push((
        "surface".to_string(),
        spawn_producer(
            "surface".to_string(),
            surface_queue,
            &settings,
            args.events_per_batch,
            running.clone(),
            0xD1B5_4A32_D192_ED03,
        )?,
    ));

    // Poll like a downstream consumer would
    let deadline = Instant::now() + Duration::from_secs_f64(args.seconds.max(0.0));
    let mut window_reads = 0u64;
    let mut roi_events = 0usize;
    let centre = Roi::new(
        (settings.surface.width / 2) as u16,
        (settings.surface.height / 2) as u16,
        10,
    );
    while Instant::now() < deadline {
        if sync.has_updated() {
            for label in &args.streams {
                for channel in 0..settings.synchronizer.channel_count {
                    sync.query_window(label, channel)?;
                    window_reads += 1;
                }
            }
        }
        roi_events += surface
            .query_roi(0, QueryLimit::Duration(BATCH_TICKS * 10), Some(centre))?
            .len();
        thread::sleep(Duration::from_millis(5));
    }

    running.store(false, Ordering::Relaxed);
    let mut batches_sent = serde_json::Map::new();
    for (label, handle) in producers {
        let sent = handle
            .join()
            .map_err(|_| anyhow::anyhow!("producer '{}' panicked", label))?;
        batches_sent.insert(label, json!(sent));
    }

    let mut delays = serde_json::Map::new();
    for channel in 0..settings.surface.channel_count {
        delays.insert(channel.to_string(), serde_json::to_value(surface.delay_status(channel)?)?);
    }

    let report = json!({
        "batches_sent": batches_sent,
        "window_reads": window_reads,
        "roi_events": roi_events,
        "surface": {
            "queue": surface.queue_stats(),
            "events_ingested": surface.events_ingested(),
            "events_skipped": surface.events_skipped(),
            "delay": delays,
        },
        "streams": sync.delay_stats(),
        "reference": sync.reference_stamps(),
        "max_backlog": sync.max_backlog(),
    });

    surface.stop();
    sync.close();

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
