//! nether-music - offline tools for the interactive music engine
//!
//! # Commands
//!
//! - `nether-music render` - Play a sound from a bank manifest and write a WAV
//! - `nether-music inspect` - List the regions, jumps and markers of a manifest
//!
//! # Usage
//!
//! ```bash
//! # 10 seconds of sound 1, switching to hook 1 after 4 seconds
//! nether-music render bank.toml --sound 1 --ticks 600 --hook 240:1 --out theme.wav
//!
//! # Show the catalog
//! nether-music inspect bank.toml
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use nether_music::{
    BankManifest, CaptureOutput, EngineConfig, Mixdown, MusicEngine, StartRequest, TrackEvent,
};
use tracing::{debug, info, warn};

/// Offline tools for the interactive music engine
#[derive(Parser)]
#[command(name = "nether-music")]
#[command(about = "Render and inspect interactive music banks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a sound through the engine and write the mix to a WAV file
    Render(RenderArgs),

    /// List the regions, jumps and markers of a bank manifest
    Inspect(InspectArgs),
}

#[derive(Args)]
struct RenderArgs {
    /// Bank manifest (TOML)
    manifest: PathBuf,

    /// Sound id to start
    #[arg(long)]
    sound: u32,

    /// Number of ticks to render
    #[arg(long)]
    ticks: u64,

    /// Hook change as TICK:HOOK (repeatable)
    #[arg(long = "hook", value_parser = parse_hook)]
    hooks: Vec<(u64, u32)>,

    /// Initial track volume (0-127)
    #[arg(long, default_value_t = 127)]
    volume: u8,

    /// Engine config (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the engine snapshot at the end of the render to this file
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Output WAV file
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args)]
struct InspectArgs {
    /// Bank manifest (TOML)
    manifest: PathBuf,

    /// Tick rate used to convert fade lengths
    #[arg(long, default_value_t = 60)]
    tick_rate: u32,
}

fn parse_hook(value: &str) -> Result<(u64, u32), String> {
    let (tick, hook) = value
        .split_once(':')
        .ok_or_else(|| format!("expected TICK:HOOK, got '{}'", value))?;
    let tick = tick
        .trim()
        .parse()
        .map_err(|e| format!("invalid tick '{}': {}", tick, e))?;
    let hook = hook
        .trim()
        .parse()
        .map_err(|e| format!("invalid hook '{}': {}", hook, e))?;
    Ok((tick, hook))
}

/// Hook changes ordered by tick
struct HookSchedule {
    changes: Vec<(u64, u32)>,
    next: usize,
}

impl HookSchedule {
    fn new(mut changes: Vec<(u64, u32)>) -> Self {
        changes.sort_by_key(|(tick, _)| *tick);
        Self { changes, next: 0 }
    }

    /// Hooks scheduled at or before `tick` that have not been handed out yet
    fn due(&mut self, tick: u64) -> Vec<u32> {
        let start = self.next;
        while self.next < self.changes.len() && self.changes[self.next].0 <= tick {
            self.next += 1;
        }
        self.changes[start..self.next].iter().map(|(_, hook)| *hook).collect()
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Render(args) => render(args),
        Commands::Inspect(args) => inspect(args),
    }
}

fn render(args: RenderArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let manifest = BankManifest::load(&args.manifest)
        .with_context(|| format!("Failed to load manifest {}", args.manifest.display()))?;
    let bank = manifest.build_bank(config.tick_rate)?;
    let Some(sample_rate) = bank.get(args.sound).map(|r| r.format.sample_rate) else {
        bail!("Sound {} is not defined in the manifest", args.sound);
    };

    let mut engine = MusicEngine::new(config, bank, CaptureOutput::new())?;
    let started = engine.start_track(StartRequest::new(args.sound, 0, args.volume, 0))?;
    info!(
        "Rendering sound {} for {} ticks at {} Hz",
        args.sound, args.ticks, sample_rate
    );

    let mut hooks = HookSchedule::new(args.hooks);
    let mut mixdown = Mixdown::new(sample_rate);
    let mut samples = Vec::new();

    for tick in 0..args.ticks {
        for hook in hooks.due(tick) {
            match engine.set_hook_id(started.track, hook) {
                Ok(()) => info!("Tick {}: hook {} requested", tick, hook),
                Err(e) => warn!("Tick {}: hook {} ignored: {}", tick, hook, e),
            }
        }

        engine.tick();
        mixdown.mix_tick(engine.output_mut(), &mut samples);

        for event in engine.drain_events() {
            match event {
                TrackEvent::ResourceFailed { sound, error, .. } => {
                    warn!("Tick {}: sound {} failed: {}", tick, sound, error)
                }
                other => debug!("Tick {}: {:?}", tick, other),
            }
        }

        if engine.active_tracks().is_empty() {
            info!("All tracks finished after {} ticks", tick + 1);
            break;
        }
    }

    if let Some(path) = &args.snapshot {
        let snapshot = engine.snapshot();
        std::fs::write(path, snapshot.to_bytes())
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        info!(
            "Wrote snapshot with {} tracks to {}",
            snapshot.records.len(),
            path.display()
        );
    }

    write_wav(&args.out, sample_rate, &samples)?;
    info!(
        "Wrote {} frames ({:.2}s) to {}",
        samples.len() / 2,
        samples.len() as f64 / 2.0 / sample_rate as f64,
        args.out.display()
    );
    Ok(())
}

fn write_wav(path: &Path, sample_rate: u32, samples: &[i16]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

fn inspect(args: InspectArgs) -> Result<()> {
    let manifest = BankManifest::load(&args.manifest)
        .with_context(|| format!("Failed to load manifest {}", args.manifest.display()))?;
    let bank = manifest.build_bank(args.tick_rate)?;

    let mut ids: Vec<u32> = manifest.sounds.iter().map(|s| s.id).collect();
    ids.sort_unstable();
    for id in ids {
        let Some(resource) = bank.get(id) else {
            continue;
        };
        let format = resource.format;
        println!(
            "sound {} '{}': {} Hz, {}-bit, {} ch, {} bytes",
            id,
            resource.name,
            format.sample_rate,
            format.bits_per_sample,
            format.channels,
            resource.data.len()
        );
        for (index, region) in resource.regions.iter().enumerate() {
            let millis = region.length as u64 * 1000 / format.bytes_per_second().max(1);
            println!(
                "  region {:>3}: offset {:>8}, {:>8} bytes ({} ms)",
                index, region.offset, region.length, millis
            );
            for edge in &region.jumps {
                println!(
                    "    hook {} -> region {} (hook {}, fade {} ticks)",
                    edge.trigger_hook, edge.target_region, edge.target_hook, edge.fade_ticks
                );
            }
            for marker in &region.markers {
                println!("    marker {} at +{}", marker.id, marker.offset);
            }
        }
    }
    Ok(())
}
