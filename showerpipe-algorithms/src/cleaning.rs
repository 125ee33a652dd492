//! Tailcuts image cleaning.
//!
//! The two-threshold scheme keeps "picture" pixels above the high
//! threshold (optionally requiring picture neighbors) and "boundary"
//! pixels above the low threshold that touch the picture. Every step is
//! a neighbor-count pass over the sparse adjacency, so cleaning costs
//! O(edges).

use serde::Deserialize;

use showerpipe_core::error::ConfigError;
use showerpipe_core::CameraGeometry;

/// Configuration for [`TailcutsCleaner`].
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TailcutsConfig {
    /// High threshold: picture candidates (photo-electrons).
    pub picture_thresh: f64,
    /// Low threshold: boundary candidates (photo-electrons).
    pub boundary_thresh: f64,
    /// Keep picture pixels without boundary neighbors.
    pub keep_isolated_pixels: bool,
    /// Picture pixels need at least this many picture neighbors.
    pub min_number_picture_neighbors: u32,
}

impl Default for TailcutsConfig {
    fn default() -> Self {
        Self {
            picture_thresh: 10.0,
            boundary_thresh: 5.0,
            keep_isolated_pixels: false,
            min_number_picture_neighbors: 2,
        }
    }
}

impl TailcutsConfig {
    /// Set the picture threshold.
    #[must_use]
    pub fn with_picture_thresh(mut self, thresh: f64) -> Self {
        self.picture_thresh = thresh;
        self
    }

    /// Set the boundary threshold.
    #[must_use]
    pub fn with_boundary_thresh(mut self, thresh: f64) -> Self {
        self.boundary_thresh = thresh;
        self
    }

    /// Keep or drop isolated picture pixels.
    #[must_use]
    pub fn with_keep_isolated_pixels(mut self, keep: bool) -> Self {
        self.keep_isolated_pixels = keep;
        self
    }

    /// Set the picture-neighbor requirement.
    #[must_use]
    pub fn with_min_number_picture_neighbors(mut self, n: u32) -> Self {
        self.min_number_picture_neighbors = n;
        self
    }

    /// Check threshold ordering: `picture >= boundary >= 0`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.boundary_thresh >= 0.0 && self.picture_thresh >= self.boundary_thresh) {
            return Err(ConfigError::InvalidValue {
                key: "picture_thresh/boundary_thresh",
                message: format!(
                    "need picture >= boundary >= 0, got picture={} boundary={}",
                    self.picture_thresh, self.boundary_thresh
                ),
            });
        }
        Ok(())
    }
}

/// Trait for image cleaning algorithms.
pub trait ImageCleaner: std::fmt::Debug + Send + Sync {
    /// Algorithm name for logging and configuration.
    fn name(&self) -> &'static str;

    /// Compute the survival mask for one camera image.
    fn clean(&self, camera: &CameraGeometry, image: &[f64]) -> Vec<bool>;
}

/// Two-threshold tailcuts cleaner.
#[derive(Clone, Debug, Default)]
pub struct TailcutsCleaner {
    config: TailcutsConfig,
}

impl TailcutsCleaner {
    /// Create with a validated configuration.
    pub fn new(config: TailcutsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &TailcutsConfig {
        &self.config
    }
}

impl ImageCleaner for TailcutsCleaner {
    fn name(&self) -> &'static str {
        "Tailcuts_cleaner"
    }

    fn clean(&self, camera: &CameraGeometry, image: &[f64]) -> Vec<bool> {
        tailcuts_clean(
            camera,
            image,
            self.config.picture_thresh,
            self.config.boundary_thresh,
            self.config.keep_isolated_pixels,
            self.config.min_number_picture_neighbors as usize,
        )
    }
}

/// Two-threshold tailcuts cleaning.
///
/// 1. Picture candidates: `image >= picture_thresh`.
/// 2. Unless isolated pixels are kept or the requirement is zero, keep
///    only candidates with at least `min_number_picture_neighbors`
///    candidate neighbors.
/// 3. Boundary candidates: `image >= boundary_thresh`.
/// 4. Survivors: boundary pixels adjacent to the picture, plus picture
///    pixels (all of them if isolated pixels are kept, otherwise only
///    those adjacent to a boundary pixel).
#[must_use]
pub fn tailcuts_clean(
    camera: &CameraGeometry,
    image: &[f64],
    picture_thresh: f64,
    boundary_thresh: f64,
    keep_isolated_pixels: bool,
    min_number_picture_neighbors: usize,
) -> Vec<bool> {
    let neigh = &camera.neigh_matrix;
    let above_picture: Vec<bool> = image.iter().map(|&v| v >= picture_thresh).collect();

    let in_picture: Vec<bool> = if keep_isolated_pixels || min_number_picture_neighbors == 0 {
        above_picture.clone()
    } else {
        let counts = neigh.count_set_neighbors(&above_picture);
        above_picture
            .iter()
            .zip(&counts)
            .map(|(&p, &c)| p && c >= min_number_picture_neighbors)
            .collect()
    };

    let above_boundary: Vec<bool> = image.iter().map(|&v| v >= boundary_thresh).collect();
    let with_picture_neighbors = neigh.has_set_neighbor(&in_picture);

    if keep_isolated_pixels {
        above_boundary
            .iter()
            .zip(&with_picture_neighbors)
            .zip(&in_picture)
            .map(|((&b, &wp), &p)| (b && wp) || p)
            .collect()
    } else {
        let with_boundary_neighbors = neigh.has_set_neighbor(&above_boundary);
        above_boundary
            .iter()
            .zip(&with_picture_neighbors)
            .zip(in_picture.iter().zip(&with_boundary_neighbors))
            .map(|((&b, &wp), (&p, &wb))| (b && wp) || (p && wb))
            .collect()
    }
}

/// Widen a mask by one ring of neighbors.
#[must_use]
pub fn dilate(camera: &CameraGeometry, mask: &[bool]) -> Vec<bool> {
    let has_neighbor = camera.neigh_matrix.has_set_neighbor(mask);
    mask.iter()
        .zip(&has_neighbor)
        .map(|(&m, &n)| m || n)
        .collect()
}
