//! Down-sampled particle grid laid over a source image.
//!
//! Every `particle_size` x `particle_size` block of source pixels becomes one
//! particle. Particles are identified purely by their index; the shaders
//! recover the cell from the index and the grid width, so the only data the
//! GPU needs per particle is a single `f32`.

/// Grid dimensions derived from an image size and a particle size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParticleGrid {
    width: u32,
    height: u32,
}

impl ParticleGrid {
    /// Builds the grid for a `width` x `height` image.
    ///
    /// Zero-area images and non-positive particle sizes produce an empty grid.
    /// An axis shorter than one particle still gets a single cell, so an image
    /// smaller than the particle size becomes exactly one particle. A grid
    /// whose particle count does not fit in a `u32` is also empty.
    pub fn new(width: u32, height: u32, particle_size: f32) -> Self {
        if width == 0 || height == 0 || !particle_size.is_finite() || particle_size <= 0.0 {
            return Self::default();
        }
        let cells = |extent: u32| {
            let cells = (f64::from(extent) / f64::from(particle_size)).floor();
            (cells.min(f64::from(u32::MAX)) as u32).max(1)
        };
        let (width, height) = (cells(width), cells(height));
        if u64::from(width) * u64::from(height) > u64::from(u32::MAX) {
            return Self::default();
        }
        Self { width, height }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn count(&self) -> u32 {
        self.width * self.height
    }

    /// Bytes the per-instance index buffer needs for this grid.
    pub fn index_bytes(&self) -> u64 {
        u64::from(self.count()) * std::mem::size_of::<f32>() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Cell `(x, y)` for a particle index, `None` past the end of the grid.
    pub fn cell(&self, index: u32) -> Option<(u32, u32)> {
        if index >= self.count() {
            return None;
        }
        Some((index % self.width, index / self.width))
    }

    /// Particle indices in draw order, as the floats the vertex stage consumes.
    pub fn indices(&self) -> Vec<f32> {
        (0..self.count()).map(|index| index as f32).collect()
    }

    /// Pixel footprint the grid covers; can be slightly smaller than the image
    /// when its size is not a multiple of the particle size.
    pub fn footprint(&self, particle_size: f32) -> [f32; 2] {
        [
            self.width as f32 * particle_size,
            self.height as f32 * particle_size,
        ]
    }
}
