use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{select, unbounded};
use dissolve::{
    Color, DissolveController, ParticleGrid, PreviewConfig, SourceImage, WindowRuntime,
    WindowSignal,
};
use effectconfig::EffectConfig;
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::paths::AppPaths;

/// Pause between a finished dissolve and the next one in `--loop` mode.
const LOOP_PAUSE: Duration = Duration::from_millis(600);
const IDLE_POLL: Duration = Duration::from_millis(250);
const TEST_CARD_SIZE: (u32, u32) = (320, 200);

/// Logs go to stderr so `config default` output can be piped into a file.
pub fn initialise_tracing() {
    let default_filter =
        "warn,dustfade=info,dissolve=info,naga=error,wgpu=error,wgpu_core=error,wgpu_hal=error,winit=error";
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

pub fn run(args: RunArgs) -> Result<()> {
    let config = load_config(&args)?;
    let image = match &args.image {
        Some(path) => SourceImage::open(path)?,
        None => {
            tracing::info!("no image given; dissolving a generated test card");
            test_card(TEST_CARD_SIZE.0, TEST_CARD_SIZE.1)?
        }
    };
    let grid = ParticleGrid::new(image.width(), image.height(), config.particle_size);
    tracing::info!(
        width = image.width(),
        height = image.height(),
        particles = grid.count(),
        duration_ms = config.duration.as_millis() as u64,
        "loaded source image"
    );

    let preview = PreviewConfig::from_config(&config);
    let runtime = WindowRuntime::spawn(preview).context("failed to open preview window")?;
    let controller = runtime.controller();
    controller.capture(image);

    tracing::info!("press Space to dissolve, R to reset, Escape to quit");
    let outcome = drive(&runtime, &controller, &args);
    let shutdown = runtime.shutdown();
    outcome.and(shutdown)
}

/// Host loop: turns window keys, timers and completions into controller calls.
fn drive(runtime: &WindowRuntime, controller: &DissolveController, args: &RunArgs) -> Result<()> {
    let (done_tx, done_rx) = unbounded::<()>();
    let trigger = |reason: &str| {
        let done_tx = done_tx.clone();
        let queued = controller.vanish(move || {
            let _ = done_tx.send(());
        });
        tracing::debug!(reason, queued, "dissolve requested");
    };

    let mut deadline = args
        .auto_start
        .map(|millis| Instant::now() + Duration::from_millis(millis));

    let mut open = true;
    while open {
        let timeout = deadline
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_POLL);
        select! {
            recv(runtime.signals()) -> signal => match signal {
                Ok(WindowSignal::Trigger) => {
                    deadline = None;
                    trigger("key");
                }
                Ok(WindowSignal::Reset) => {
                    deadline = None;
                    controller.reset();
                    tracing::info!("dissolve reset");
                }
                Ok(WindowSignal::Closed) | Err(_) => open = false,
            },
            recv(done_rx) -> _ => {
                tracing::info!("dissolve complete");
                if args.repeat {
                    deadline = Some(Instant::now() + LOOP_PAUSE);
                }
            },
            default(timeout) => {
                if deadline.is_some_and(|at| Instant::now() >= at) {
                    deadline = None;
                    trigger("timer");
                }
            },
        }
    }
    Ok(())
}

/// Resolves the config file (explicit path, then the default location) and
/// layers command-line overrides on top.
pub fn load_config(args: &RunArgs) -> Result<EffectConfig> {
    let mut config = match &args.config {
        Some(path) => EffectConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            let path = AppPaths::discover()?.config_file();
            if path.is_file() {
                tracing::debug!(path = %path.display(), "loading default config");
                EffectConfig::from_path(&path)
                    .with_context(|| format!("failed to load config {}", path.display()))?
            } else {
                EffectConfig::default()
            }
        }
    };
    args.apply_overrides(&mut config);
    config.validate().context("invalid settings")?;
    Ok(config)
}

/// Diagonal colour bands with a transparent border, enough to see the wave
/// travel across the image and the background compositing at work.
pub fn test_card(width: u32, height: u32) -> Result<SourceImage> {
    let palette = [
        Color::rgba(0xe6, 0x39, 0x46, 0xff),
        Color::rgba(0xf4, 0xa2, 0x61, 0xff),
        Color::rgba(0x2a, 0x9d, 0x8f, 0xff),
        Color::rgba(0x26, 0x46, 0x53, 0xff),
    ];
    let border = 8;
    let mut data = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            let inside = x >= border && y >= border && x + border < width && y + border < height;
            let color = if inside {
                palette[((x + y) / 24) as usize % palette.len()]
            } else {
                Color::TRANSPARENT
            };
            data.extend_from_slice(&color.to_array());
        }
    }
    SourceImage::from_rgba(width, height, data)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn explicit_config_is_loaded_and_overridden() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fade.toml");
        fs::write(&path, "duration = 1200\nparticle_size = 3\n").unwrap();

        let args = RunArgs {
            config: Some(path),
            particle_size: Some(5.0),
            ..RunArgs::default()
        };
        let config = load_config(&args).expect("config loads");
        assert_eq!(config.duration, Duration::from_millis(1200));
        assert_eq!(config.particle_size, 5.0);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fade.toml");
        fs::write(&path, "").unwrap();
        let args = RunArgs {
            config: Some(path),
            particle_size: Some(0.0),
            ..RunArgs::default()
        };
        let err = load_config(&args).unwrap_err();
        assert!(format!("{err:#}").contains("particle_size"));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let args = RunArgs {
            config: Some(dir.path().join("absent.toml")),
            ..RunArgs::default()
        };
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_card_has_transparent_border() {
        let card = test_card(64, 48).expect("test card");
        assert_eq!((card.width(), card.height()), (64, 48));
        assert_eq!(card.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(card.pixel(32, 24).map(|pixel| pixel[3]), Some(0xff));
        assert!(card.has_transparency());
    }
}
