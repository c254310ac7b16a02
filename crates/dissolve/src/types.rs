use std::time::Duration;

use effectconfig::{
    particle_size_in_range, Color, EffectConfig, Sampling, DEFAULT_DURATION, DEFAULT_PARTICLE_SIZE,
};

/// Timing and sampling knobs for a single dissolve run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectSettings {
    /// Total length of the animation; the completion callback fires once it elapses.
    pub duration: Duration,
    /// Edge length of one particle in source pixels.
    pub particle_size: f32,
    /// Filtering used when particles sample the source texture.
    pub sampling: Sampling,
}

impl EffectSettings {
    pub fn new(duration: Duration, particle_size: f32) -> Self {
        Self {
            duration,
            particle_size,
            sampling: Sampling::default(),
        }
    }

    pub fn from_config(config: &EffectConfig) -> Self {
        Self {
            duration: config.duration,
            particle_size: config.particle_size,
            sampling: config.sampling,
        }
    }

    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    /// False when the particle size would produce a degenerate or oversized
    /// particle grid; such settings are never queued.
    pub fn is_usable(&self) -> bool {
        particle_size_in_range(self.particle_size)
    }

    /// Duration in the millisecond units the shaders work in.
    pub fn duration_ms(&self) -> f32 {
        self.duration.as_secs_f32() * 1000.0
    }
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION,
            particle_size: DEFAULT_PARTICLE_SIZE,
            sampling: Sampling::default(),
        }
    }
}

/// Size of the render target in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Where the top-left corner of the source image sits in the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Placement {
    /// Explicit offset in viewport pixels, typically the captured content's bounds.
    At { left: f32, top: f32 },
    /// Centre the image in whatever viewport is current when the request is applied.
    #[default]
    Centered,
}

impl Placement {
    pub fn at(left: f32, top: f32) -> Self {
        Placement::At { left, top }
    }

    pub fn resolve(self, viewport: Viewport, image_width: u32, image_height: u32) -> [f32; 2] {
        match self {
            Placement::At { left, top } => [left, top],
            Placement::Centered => [
                (viewport.width as f32 - image_width as f32) / 2.0,
                (viewport.height as f32 - image_height as f32) / 2.0,
            ],
        }
    }
}

/// Declares how the compositor should treat the swapchain alpha channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceAlpha {
    /// Frames fully cover the surface.
    #[default]
    Opaque,
    /// Frames may contain transparency and should be blended over whatever is below.
    Transparent,
}

/// Immutable configuration passed to the preview window at start-up.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Window size in physical pixels.
    pub surface_size: (u32, u32),
    pub title: String,
    /// Colour the surface is cleared to before particles are drawn.
    pub clear_color: Color,
    pub surface_alpha: SurfaceAlpha,
    /// Settings used by `vanish` calls that do not carry their own.
    pub settings: EffectSettings,
    /// Fill colour composited under captured content that has no backing of its own.
    pub background_color: Color,
    pub composite_background: bool,
    /// Create the window hidden; used by callers that only want the render thread.
    pub show_window: bool,
}

impl PreviewConfig {
    pub fn from_config(config: &EffectConfig) -> Self {
        let surface_alpha = if config.window.clear_color.is_opaque() {
            SurfaceAlpha::Opaque
        } else {
            SurfaceAlpha::Transparent
        };
        Self {
            surface_size: (config.window.width, config.window.height),
            title: config.window.title.clone(),
            clear_color: config.window.clear_color,
            surface_alpha,
            settings: EffectSettings::from_config(config),
            background_color: config.background_color,
            composite_background: config.composite_background,
            show_window: true,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self::from_config(&EffectConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centred_placement_splits_leftover_space() {
        let viewport = Viewport::new(400, 300);
        assert_eq!(Placement::Centered.resolve(viewport, 300, 200), [50.0, 50.0]);
        assert_eq!(Placement::at(7.0, 9.0).resolve(viewport, 300, 200), [7.0, 9.0]);
    }

    #[test]
    fn centred_placement_goes_negative_for_oversized_images() {
        let viewport = Viewport::new(100, 100);
        assert_eq!(Placement::Centered.resolve(viewport, 200, 120), [-50.0, -10.0]);
    }

    #[test]
    fn settings_follow_config() {
        let config = EffectConfig::from_toml_str(
            "duration = 1200\nparticle_size = 4\nsampling = \"nearest\"",
        )
        .expect("config");
        let settings = EffectSettings::from_config(&config);
        assert_eq!(settings.duration, Duration::from_millis(1200));
        assert_eq!(settings.particle_size, 4.0);
        assert_eq!(settings.sampling, Sampling::Nearest);
        assert!((settings.duration_ms() - 1200.0).abs() < 1e-3);
    }

    #[test]
    fn sub_pixel_particle_sizes_are_unusable() {
        assert!(EffectSettings::default().is_usable());
        assert!(!EffectSettings::new(Duration::from_millis(1800), 0.001).is_usable());
        assert!(!EffectSettings::new(Duration::from_millis(1800), f32::NAN).is_usable());
        assert!(!EffectSettings::new(Duration::from_millis(1800), 1024.0).is_usable());
    }

    #[test]
    fn transparent_clear_colour_requests_transparent_surface() {
        let preview = PreviewConfig::default();
        assert_eq!(preview.surface_alpha, SurfaceAlpha::Transparent);
        assert_eq!(preview.surface_size, (800, 600));
    }
}
