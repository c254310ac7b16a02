//! CPU model of the per-particle maths evaluated by the dissolve shaders.
//!
//! The GPU never consults this module while rendering; the vertex and
//! fragment stages in [`crate::compile`] carry their own copy of every
//! formula. `ParticleModel` exists so hosts can reason about a particle's
//! timeline (for example, to schedule work when the left edge has cleared)
//! and so the timing properties can be checked without a device. Keep the
//! two in lockstep when changing either.

use crate::grid::ParticleGrid;
use crate::types::Viewport;

/// Exponent applied to the lifetime before it drives the shrink mask and fade.
pub const VISIBILITY_EXPONENT: i32 = 5;

fn fract(value: f32) -> f32 {
    let fraction = value - value.floor();
    // Tiny negative inputs round up to exactly 1.0.
    if fraction >= 1.0 {
        0.0
    } else {
        fraction
    }
}

/// Scalar hash used to scatter particles along one axis.
pub fn hash1(value: f32) -> f32 {
    fract(value.sin() * 100_000.0)
}

/// Classic `dot(st, (12.9898, 78.233))` hash, in `[0, 1)`.
pub fn hash2(value: [f32; 2]) -> f32 {
    let dot = value[0] * 12.9898 + value[1] * 78.233;
    fract(dot.sin() * 43_758.545)
}

fn lerp(start: f32, end: f32, factor: f32) -> f32 {
    start + (end - start) * factor
}

/// Start delay and window for one particle, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleTiming {
    /// Pseudo-random scalar in `[0, 1)` derived from the particle position.
    pub random: f32,
    pub delay: f32,
    pub window: f32,
}

impl ParticleTiming {
    /// Elapsed time at which the particle has fully dissolved.
    pub fn end(&self) -> f32 {
        self.delay + self.window
    }

    /// Progress in `[0, 1]` after `elapsed_ms`.
    pub fn lifetime(&self, elapsed_ms: f32) -> f32 {
        let end = self.end();
        if end <= 0.0 {
            return 1.0;
        }
        (elapsed_ms.max(0.0) / end).min(1.0)
    }
}

/// Where a particle is and what it samples at a given instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleState {
    pub lifetime: f32,
    /// Clip-space centre of the particle's sprite.
    pub position: [f32; 2],
    /// Clip-space centre before any displacement.
    pub origin: [f32; 2],
    /// Texture coordinate the particle samples for its colour.
    pub uv: [f32; 2],
}

/// Inputs shared by every particle of one dissolve run.
#[derive(Debug, Clone, Copy)]
pub struct ParticleModel {
    grid: ParticleGrid,
    particle_size: f32,
    origin: [f32; 2],
    viewport: Viewport,
    duration_ms: f32,
}

impl ParticleModel {
    pub fn new(
        grid: ParticleGrid,
        particle_size: f32,
        origin: [f32; 2],
        viewport: Viewport,
        duration_ms: f32,
    ) -> Self {
        Self {
            grid,
            particle_size,
            origin,
            viewport,
            duration_ms,
        }
    }

    pub fn grid(&self) -> &ParticleGrid {
        &self.grid
    }

    fn viewport_size(&self) -> (f32, f32) {
        (
            self.viewport.width.max(1) as f32,
            self.viewport.height.max(1) as f32,
        )
    }

    /// Sprite centre in viewport pixels.
    pub fn pixel_center(&self, index: u32) -> Option<[f32; 2]> {
        let (x, y) = self.grid.cell(index)?;
        Some([
            self.particle_size * (x as f32 + 0.5) + self.origin[0],
            self.particle_size * (y as f32 + 0.5) + self.origin[1],
        ])
    }

    /// Pixel position mapped into `[-1, 1]` clip space, y pointing up.
    pub fn normalize(&self, pixel: [f32; 2]) -> [f32; 2] {
        let (width, height) = self.viewport_size();
        [2.0 * pixel[0] / width - 1.0, 1.0 - 2.0 * pixel[1] / height]
    }

    fn timing_at(&self, pixel: [f32; 2]) -> ParticleTiming {
        let (width, _) = self.viewport_size();
        let random = hash2(pixel);
        let min_window = self.duration_ms / 4.0;
        ParticleTiming {
            random,
            delay: pixel[0] / width * min_window,
            window: min_window * (1.0 + random),
        }
    }

    pub fn timing(&self, index: u32) -> Option<ParticleTiming> {
        self.pixel_center(index).map(|pixel| self.timing_at(pixel))
    }

    pub fn lifetime(&self, index: u32, elapsed_ms: f32) -> Option<f32> {
        self.timing(index).map(|timing| timing.lifetime(elapsed_ms))
    }

    /// Latest instant at which any particle is still visible.
    pub fn last_particle_end(&self) -> f32 {
        (0..self.grid.count())
            .filter_map(|index| self.timing(index))
            .map(|timing| timing.end())
            .fold(0.0, f32::max)
    }

    pub fn state(&self, index: u32, elapsed_ms: f32) -> Option<ParticleState> {
        let pixel = self.pixel_center(index)?;
        let (width, _) = self.viewport_size();
        let timing = self.timing_at(pixel);
        let lifetime = timing.lifetime(elapsed_ms);
        let acceleration = 1.0 + 3.0 * (pixel[0] / width);
        let factor = lifetime.powf(acceleration);

        let origin = self.normalize(pixel);
        let [nx, ny] = origin;
        let target_x = nx + (fract(10_000.0 * hash1(ny) * hash1(ny) * timing.random) - 0.5);
        let target_y = ny + (fract(100_000.0 * hash1(nx) * hash1(nx) * timing.random) - 0.25);

        let footprint = self.grid.footprint(self.particle_size);
        let uv = [
            (pixel[0] - self.origin[0]) / footprint[0].max(f32::EPSILON),
            (pixel[1] - self.origin[1]) / footprint[1].max(f32::EPSILON),
        ];

        Some(ParticleState {
            lifetime,
            position: [lerp(nx, target_x, factor), lerp(ny, target_y, factor)],
            origin,
            uv,
        })
    }
}

/// `lifetime^5`: drives both the shrinking mask and the fade.
pub fn visibility(lifetime: f32) -> f32 {
    lifetime.powi(VISIBILITY_EXPONENT)
}

/// Radius of the circular mask inside a sprite, in point-coordinate units.
pub fn mask_radius(lifetime: f32) -> f32 {
    1.0 - visibility(lifetime)
}

/// Alpha written for a fragment, or `None` when the fragment stage discards it.
///
/// `distance` is measured from the sprite centre in point-coordinate units
/// (the sprite spans `[0, 1]` on both axes).
pub fn fragment_alpha(source_alpha: f32, lifetime: f32, distance: f32) -> Option<f32> {
    if lifetime >= 1.0 || source_alpha <= 0.0 {
        return None;
    }
    if distance > mask_radius(lifetime) {
        return None;
    }
    Some(lerp(source_alpha, 0.0, visibility(lifetime)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_model() -> ParticleModel {
        let grid = ParticleGrid::new(300, 200, 2.0);
        ParticleModel::new(grid, 2.0, [50.0, 40.0], Viewport::new(400, 300), 1800.0)
    }

    #[test]
    fn hashes_stay_in_unit_interval() {
        for step in 0..500 {
            let value = step as f32 * 0.731 - 120.0;
            let single = hash1(value);
            let pair = hash2([value, value * 0.5 + 3.0]);
            assert!((0.0..1.0).contains(&single), "hash1({value}) = {single}");
            assert!((0.0..1.0).contains(&pair), "hash2({value}) = {pair}");
        }
    }

    #[test]
    fn lifetime_is_monotonic_and_saturates() {
        let model = reference_model();
        for index in [0, 1, 149, 150, 7_777, 14_999] {
            let timing = model.timing(index).expect("index in range");
            let mut last = 0.0;
            for step in 0..=200 {
                let elapsed = step as f32 * 10.0;
                let lifetime = timing.lifetime(elapsed);
                assert!(lifetime >= last, "lifetime decreased for particle {index}");
                assert!((0.0..=1.0).contains(&lifetime));
                last = lifetime;
            }
            assert_eq!(timing.lifetime(timing.end()), 1.0);
            assert_eq!(timing.lifetime(timing.end() + 1.0), 1.0);
            assert!(timing.lifetime(timing.end() * 0.5) < 1.0);
        }
    }

    #[test]
    fn particles_start_at_their_origin() {
        let model = reference_model();
        for index in [0, 42, 150, 9_999, 14_999] {
            let state = model.state(index, 0.0).expect("index in range");
            assert_eq!(state.lifetime, 0.0);
            assert_eq!(state.position, state.origin);
        }
    }

    #[test]
    fn left_edge_starts_before_right_edge() {
        let model = reference_model();
        let left = model.timing(0).unwrap();
        let right = model.timing(149).unwrap();
        assert!(left.delay < right.delay);
        assert!(left.window >= 450.0 && left.window < 900.0);
    }

    #[test]
    fn particles_move_once_animating() {
        let model = reference_model();
        let moved = (0..model.grid().count())
            .step_by(97)
            .filter_map(|index| model.state(index, 600.0))
            .filter(|state| state.position != state.origin)
            .count();
        assert!(moved > 0);
    }

    #[test]
    fn uv_covers_the_image_footprint() {
        let model = reference_model();
        let first = model.state(0, 0.0).unwrap();
        assert!((first.uv[0] - 1.0 / 300.0).abs() < 1e-6);
        assert!((first.uv[1] - 1.0 / 200.0).abs() < 1e-6);
        let last = model.state(14_999, 0.0).unwrap();
        assert!((last.uv[0] - 299.0 / 300.0).abs() < 1e-5);
        assert!((last.uv[1] - 199.0 / 200.0).abs() < 1e-5);
    }

    #[test]
    fn everything_has_dissolved_once_duration_passes() {
        let model = reference_model();
        assert!(model.last_particle_end() <= 1800.0);
        for index in 0..model.grid().count() {
            assert_eq!(model.lifetime(index, 1800.5), Some(1.0));
        }
    }

    #[test]
    fn fresh_particles_render_their_source_pixel() {
        // Farthest point of a sprite from its centre is a corner at sqrt(0.5).
        let corner = 0.5_f32.sqrt();
        assert_eq!(mask_radius(0.0), 1.0);
        assert_eq!(fragment_alpha(0.8, 0.0, corner), Some(0.8));
        assert_eq!(fragment_alpha(1.0, 0.0, 0.0), Some(1.0));
    }

    #[test]
    fn fragments_discard_when_dissolved_or_transparent() {
        assert_eq!(fragment_alpha(1.0, 1.0, 0.0), None);
        assert_eq!(fragment_alpha(0.0, 0.2, 0.0), None);
        let late = 0.95;
        assert!(fragment_alpha(1.0, late, 0.9).is_none());
        let alpha = fragment_alpha(1.0, late, 0.0).unwrap();
        assert!(alpha < 0.3);
    }
}
