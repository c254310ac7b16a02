use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// Dissolve length used when the config does not name one.
pub const DEFAULT_DURATION: Duration = Duration::from_millis(1800);
/// Edge length of one particle in source pixels.
pub const DEFAULT_PARTICLE_SIZE: f32 = 2.0;
/// Smallest particle edge; sub-pixel particles multiply the instance count
/// without adding detail.
pub const MIN_PARTICLE_SIZE: f32 = 1.0;
/// Particles larger than this stop looking like dust and start looking like tiles.
pub const MAX_PARTICLE_SIZE: f32 = 256.0;

/// True when `size` lies within `MIN_PARTICLE_SIZE..=MAX_PARTICLE_SIZE`.
pub fn particle_size_in_range(size: f32) -> bool {
    (MIN_PARTICLE_SIZE..=MAX_PARTICLE_SIZE).contains(&size)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to read configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Straight (non-premultiplied) RGBA colour with 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Normalised channels in `[0, 1]`, handy for GPU clear colours.
    pub fn to_f64(self) -> [f64; 4] {
        [
            f64::from(self.r) / 255.0,
            f64::from(self.g) / 255.0,
            f64::from(self.b) / 255.0,
            f64::from(self.a) / 255.0,
        ]
    }

    pub fn is_opaque(self) -> bool {
        self.a == u8::MAX
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_opaque() {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(
                f,
                "#{:02x}{:02x}{:02x}{:02x}",
                self.r, self.g, self.b, self.a
            )
        }
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "white" => return Ok(Color::WHITE),
            "black" => return Ok(Color::BLACK),
            "transparent" | "none" => return Ok(Color::TRANSPARENT),
            _ => {}
        }

        let hex = normalized
            .strip_prefix('#')
            .ok_or_else(|| format!("invalid colour '{raw}'; expected #RRGGBB or #RRGGBBAA"))?;
        if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(format!("invalid colour '{raw}'; contains non-hex digits"));
        }
        let channel = |index: usize| {
            u8::from_str_radix(&hex[index * 2..index * 2 + 2], 16)
                .map_err(|err| format!("invalid colour '{raw}': {err}"))
        };
        match hex.len() {
            6 => Ok(Color::rgba(channel(0)?, channel(1)?, channel(2)?, 255)),
            8 => Ok(Color::rgba(
                channel(0)?,
                channel(1)?,
                channel(2)?,
                channel(3)?,
            )),
            _ => Err(format!(
                "invalid colour '{raw}'; expected #RRGGBB or #RRGGBBAA"
            )),
        }
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

impl Serialize for Color {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Texture filtering applied when particles sample the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sampling {
    #[default]
    Linear,
    Nearest,
}

impl FromStr for Sampling {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "linear" | "smooth" => Ok(Sampling::Linear),
            "nearest" | "pixelated" => Ok(Sampling::Nearest),
            other => Err(format!(
                "invalid sampling '{other}'; expected 'linear' or 'nearest'"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EffectConfig {
    #[serde(
        default = "default_duration",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub duration: Duration,
    #[serde(default = "default_particle_size")]
    pub particle_size: f32,
    #[serde(default)]
    pub background_color: Color,
    #[serde(default)]
    pub composite_background: bool,
    #[serde(default)]
    pub sampling: Sampling,
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,
    #[serde(default = "default_window_height")]
    pub height: u32,
    #[serde(default = "default_window_title")]
    pub title: String,
    #[serde(default = "default_clear_color")]
    pub clear_color: Color,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
            title: default_window_title(),
            clear_color: default_clear_color(),
        }
    }
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            particle_size: default_particle_size(),
            background_color: Color::default(),
            composite_background: false,
            sampling: Sampling::default(),
            window: WindowConfig::default(),
        }
    }
}

fn default_duration() -> Duration {
    DEFAULT_DURATION
}

fn default_particle_size() -> f32 {
    DEFAULT_PARTICLE_SIZE
}

fn default_window_width() -> u32 {
    800
}

fn default_window_height() -> u32 {
    600
}

fn default_window_title() -> String {
    "dustfade".to_string()
}

fn default_clear_color() -> Color {
    Color::TRANSPARENT
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
    serializer.serialize_u64(millis)
}

/// Accepts a bare number of milliseconds or a human-readable string (`"1.8s"`, `"900ms"`).
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of milliseconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            parse_duration(v).map_err(E::custom)
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_millis(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_millis(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() || v.is_infinite() {
                return Err(E::custom("duration must be a finite non-negative number"));
            }
            Ok(Duration::from_secs_f64(v / 1000.0))
        }
    }

    deserializer.deserialize_any(Visitor)
}

/// Parses the same duration syntax the config file accepts; shared with the CLI.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let trimmed = raw.trim();
    if let Ok(millis) = trimmed.parse::<u64>() {
        return Ok(Duration::from_millis(millis));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{raw}': {err}"))
}

impl EffectConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: EffectConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.duration.is_zero() {
            return Err(ConfigError::Invalid(
                "duration must be greater than zero".into(),
            ));
        }

        if !particle_size_in_range(self.particle_size) {
            return Err(ConfigError::Invalid(format!(
                "particle_size must be {MIN_PARTICLE_SIZE}..={MAX_PARTICLE_SIZE} px (got {})",
                self.particle_size
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero (got {}x{})",
                self.window.width, self.window.height
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
duration = "2.5s"
particle_size = 3
background_color = "#102030"
composite_background = true
sampling = "nearest"

[window]
width = 1024
height = 768
title = "snap"
clear_color = "#00000080"
"##;

    #[test]
    fn parses_sample_config() {
        let config = EffectConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.duration, Duration::from_millis(2500));
        assert_eq!(config.particle_size, 3.0);
        assert_eq!(config.background_color, Color::rgba(0x10, 0x20, 0x30, 255));
        assert!(config.composite_background);
        assert_eq!(config.sampling, Sampling::Nearest);
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.clear_color, Color::rgba(0, 0, 0, 0x80));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = EffectConfig::from_toml_str("").expect("parse empty config");
        assert_eq!(config, EffectConfig::default());
        assert_eq!(config.duration, Duration::from_millis(1800));
        assert_eq!(config.particle_size, 2.0);
        assert_eq!(config.background_color, Color::WHITE);
    }

    #[test]
    fn bare_numbers_are_milliseconds() {
        let config = EffectConfig::from_toml_str("duration = 900").unwrap();
        assert_eq!(config.duration, Duration::from_millis(900));
    }

    #[test]
    fn rejects_zero_duration() {
        let err = EffectConfig::from_toml_str("duration = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_tiny_particles() {
        let err = EffectConfig::from_toml_str("particle_size = 0.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn particle_size_range_excludes_nan_and_extremes() {
        assert!(particle_size_in_range(MIN_PARTICLE_SIZE));
        assert!(particle_size_in_range(MAX_PARTICLE_SIZE));
        assert!(!particle_size_in_range(0.001));
        assert!(!particle_size_in_range(MAX_PARTICLE_SIZE + 1.0));
        assert!(!particle_size_in_range(f32::NAN));
        assert!(!particle_size_in_range(f32::INFINITY));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = EffectConfig::from_toml_str("speed = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_malformed_colour() {
        let err = EffectConfig::from_toml_str("background_color = \"#12345\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn colour_parsing_accepts_names_and_alpha() {
        assert_eq!("white".parse::<Color>().unwrap(), Color::WHITE);
        assert_eq!("#FF000080".parse::<Color>().unwrap(), Color::rgba(255, 0, 0, 128));
        assert!("ff0000".parse::<Color>().is_err());
        assert_eq!(Color::rgba(255, 0, 0, 255).to_string(), "#ff0000");
        assert_eq!(Color::rgba(1, 2, 3, 4).to_string(), "#01020304");
    }

    #[test]
    fn serialised_defaults_parse_back() {
        let rendered = EffectConfig::default().to_toml_string().unwrap();
        assert!(rendered.contains("duration = 1800"));
        let parsed = EffectConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, EffectConfig::default());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EffectConfig::from_path(Path::new("/definitely/not/here.toml")).unwrap_err();
        match err {
            ConfigError::Io { path, .. } => assert!(path.ends_with("here.toml")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
