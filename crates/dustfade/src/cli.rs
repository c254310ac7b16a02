use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use effectconfig::{parse_duration, Color, EffectConfig, Sampling, DEFAULT_PARTICLE_SIZE};

use crate::paths::ENV_CONFIG_FILE;

#[derive(Parser, Debug)]
#[command(
    name = "dustfade",
    author,
    version,
    about = "Dissolve an image into drifting dust",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Image to dissolve (PNG, JPEG, BMP or GIF). A generated test card is used when omitted.
    #[arg(value_name = "IMAGE")]
    pub image: Option<PathBuf>,

    /// Configuration file; defaults to `<config dir>/dustfade/config.toml` when present.
    #[arg(long, value_name = "FILE", env = ENV_CONFIG_FILE)]
    pub config: Option<PathBuf>,

    /// Dissolve length as milliseconds or a human-readable duration (`1.8s`, `900ms`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Edge length of one particle in source pixels.
    #[arg(long, value_name = "PIXELS")]
    pub particle_size: Option<f32>,

    /// Colour composited under transparent images (`#RRGGBB`, `#RRGGBBAA`, `white`, ...).
    #[arg(long, value_name = "COLOR", value_parser = parse_color)]
    pub background: Option<Color>,

    /// Flatten transparent images onto the background colour before dissolving.
    #[arg(long)]
    pub composite_background: bool,

    /// Texture filtering for particle colours: `linear` or `nearest`.
    #[arg(long, value_name = "MODE", value_parser = parse_sampling)]
    pub sampling: Option<Sampling>,

    /// Preview window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<SurfaceSize>,

    /// Start dissolving automatically after this many milliseconds.
    #[arg(long, value_name = "MILLISECONDS")]
    pub auto_start: Option<u64>,

    /// Restart the dissolve each time it completes.
    #[arg(long = "loop")]
    pub repeat: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect configuration files.
    Config(ConfigCommand),
    /// Print the particle grid a source image of the given size produces.
    Grid(GridArgs),
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Parse and validate a configuration file.
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print the built-in configuration as TOML.
    Default,
    /// Print where the default configuration file is looked up.
    Where,
}

#[derive(Parser, Debug)]
pub struct GridArgs {
    /// Source image width in pixels.
    pub width: u32,
    /// Source image height in pixels.
    pub height: u32,
    #[arg(long, value_name = "PIXELS", default_value_t = DEFAULT_PARTICLE_SIZE)]
    pub particle_size: f32,
}

pub fn parse() -> Cli {
    Cli::parse()
}

impl RunArgs {
    /// Layers command-line flags over values loaded from the config file.
    pub fn apply_overrides(&self, config: &mut EffectConfig) {
        if let Some(duration) = self.duration {
            config.duration = duration;
        }
        if let Some(particle_size) = self.particle_size {
            config.particle_size = particle_size;
        }
        if let Some(background) = self.background {
            config.background_color = background;
        }
        if self.composite_background {
            config.composite_background = true;
        }
        if let Some(sampling) = self.sampling {
            config.sampling = sampling;
        }
        if let Some(size) = self.size {
            config.window.width = size.width;
            config.window.height = size.height;
        }
    }
}

pub fn parse_color(value: &str) -> Result<Color, String> {
    value.parse()
}

pub fn parse_sampling(value: &str) -> Result<Sampling, String> {
    value.parse()
}

pub fn parse_surface_size(value: &str) -> Result<SurfaceSize, String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{}'", w.trim()))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{}'", h.trim()))?;
    if width == 0 || height == 0 {
        return Err("window dimensions must be greater than zero".into());
    }
    Ok(SurfaceSize { width, height })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_surface_sizes() {
        assert_eq!(
            parse_surface_size("1280x720").unwrap(),
            SurfaceSize {
                width: 1280,
                height: 720
            }
        );
        assert_eq!(
            parse_surface_size(" 640 X 480 ").unwrap(),
            SurfaceSize {
                width: 640,
                height: 480
            }
        );
        assert!(parse_surface_size("1280").is_err());
        assert!(parse_surface_size("0x720").is_err());
        assert!(parse_surface_size("wide x tall").is_err());
    }

    #[test]
    fn flags_override_config_values() {
        let args = Cli::try_parse_from([
            "dustfade",
            "photo.png",
            "--duration",
            "900ms",
            "--particle-size",
            "4",
            "--background",
            "#000000",
            "--composite-background",
            "--sampling",
            "nearest",
            "--size",
            "320x240",
        ])
        .expect("valid arguments")
        .run;

        let mut config = EffectConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.duration, Duration::from_millis(900));
        assert_eq!(config.particle_size, 4.0);
        assert_eq!(config.background_color, Color::BLACK);
        assert!(config.composite_background);
        assert_eq!(config.sampling, Sampling::Nearest);
        assert_eq!((config.window.width, config.window.height), (320, 240));
        assert_eq!(args.image, Some(PathBuf::from("photo.png")));
    }

    #[test]
    fn absent_flags_keep_config_values() {
        let loaded = EffectConfig {
            particle_size: 6.0,
            ..EffectConfig::default()
        };
        let mut config = loaded.clone();
        RunArgs::default().apply_overrides(&mut config);
        assert_eq!(config.particle_size, 6.0);
        assert_eq!(config, loaded);
    }

    #[test]
    fn grid_subcommand_defaults_particle_size() {
        let cli = Cli::try_parse_from(["dustfade", "grid", "300", "200"]).expect("grid args");
        match cli.command {
            Some(Command::Grid(args)) => {
                assert_eq!((args.width, args.height), (300, 200));
                assert_eq!(args.particle_size, DEFAULT_PARTICLE_SIZE);
            }
            other => panic!("expected grid subcommand, got {other:?}"),
        }
    }
}
