//! Per-telescope DL1 driver: cleaning, parameterization, quality data.

use std::collections::HashMap;

use log::{debug, warn};
use rand_distr::{Distribution, Poisson};
use serde::Deserialize;

use showerpipe_core::coords::{Horizontal, NominalFrame};
use showerpipe_core::{
    ArrayEvent, CameraGeometry, Dl1Camera, ExtraParameters, HillasParameters, ImageParameters,
    SubarrayDescription, TelId,
};

use crate::cleaning::{dilate, ImageCleaner, TailcutsCleaner, TailcutsConfig};
use crate::concentration::concentration_parameters;
use crate::leakage::leakage_parameters;
use crate::moments::{hillas_parameters, intensity_parameters, MIN_PIXELS};
use crate::morphology::morphology_parameters;

/// Image processor configuration, one section of the pipeline JSON.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageProcessorConfig {
    /// Mean night-sky-background photo-electrons per pixel added when
    /// synthesizing images from simulation truth; 0 disables synthesis.
    pub poisson_noise: f64,
    /// Cleaner algorithm name.
    pub image_cleaner_type: String,
    /// Settings for the tailcuts cleaner.
    #[serde(rename = "TailcutsCleaner")]
    pub tailcuts: TailcutsConfig,
    /// Extra dilation rounds applied to the cleaning mask before
    /// parameterization.
    pub dilate_count: u32,
    /// Radial field-of-view cut in degrees; pixels farther from the
    /// camera center are removed from the mask.
    pub cut_radius_deg: Option<f64>,
}

impl Default for ImageProcessorConfig {
    fn default() -> Self {
        Self {
            poisson_noise: 0.0,
            image_cleaner_type: "Tailcuts_cleaner".to_string(),
            tailcuts: TailcutsConfig::default(),
            dilate_count: 0,
            cut_radius_deg: None,
        }
    }
}

/// Pixels within a radial field-of-view cut.
///
/// The angular distance of a pixel is its focal-plane radius over the
/// focal length (small-angle); the cut radius is given in degrees.
#[must_use]
pub fn cut_pixel_distance(
    camera: &CameraGeometry,
    focal_length: f64,
    cut_radius_deg: f64,
) -> Vec<bool> {
    let limit = cut_radius_deg.to_radians();
    camera
        .pix_x
        .iter()
        .zip(&camera.pix_y)
        .map(|(&x, &y)| (x * x + y * y).sqrt() / focal_length <= limit)
        .collect()
}

/// Drives cleaning and parameterization for every telescope in an
/// event.
///
/// Caches the per-telescope field-of-view masks across events; nothing
/// else persists.
#[derive(Debug)]
pub struct ImageProcessor {
    config: ImageProcessorConfig,
    cleaner: Box<dyn ImageCleaner>,
    fov_masks: HashMap<TelId, Vec<bool>>,
}

impl ImageProcessor {
    /// Build the configured cleaner.
    ///
    /// # Errors
    /// Fails on an unknown cleaner name or invalid thresholds.
    pub fn new(config: ImageProcessorConfig) -> showerpipe_core::Result<Self> {
        let cleaner: Box<dyn ImageCleaner> = match config.image_cleaner_type.as_str() {
            "Tailcuts_cleaner" => Box::new(TailcutsCleaner::new(config.tailcuts)?),
            other => {
                return Err(showerpipe_core::ConfigError::UnknownName {
                    kind: "image cleaner",
                    name: other.to_string(),
                }
                .into())
            }
        };
        Ok(Self {
            config,
            cleaner,
            fov_masks: HashMap::new(),
        })
    }

    /// Clean and parameterize every DL1 camera in the event.
    ///
    /// In simulation-only mode (no DL1 but truth present and
    /// `poisson_noise > 0`) images are synthesized from the true
    /// photo-electron counts first.
    pub fn apply(&mut self, subarray: &SubarrayDescription, event: &mut ArrayEvent) {
        if event.dl1.is_none() && self.config.poisson_noise > 0.0 && event.simulation.is_some() {
            self.synthesize_from_truth(event);
        }
        let Some(mut dl1) = event.dl1.take() else {
            return;
        };

        for (&tel_id, camera_data) in &mut dl1.tels {
            let Some(telescope) = subarray.tels.get(&tel_id) else {
                warn!("event {}: telescope {tel_id} not in subarray, skipping", event.event_id);
                continue;
            };
            let geometry = &telescope.camera.geometry;
            if camera_data.image.len() != geometry.num_pixels {
                warn!(
                    "event {}: telescope {tel_id} image has {} pixels, camera has {}",
                    event.event_id,
                    camera_data.image.len(),
                    geometry.num_pixels
                );
                continue;
            }

            let mut mask = self.cleaner.clean(geometry, &camera_data.image);
            for _ in 0..self.config.dilate_count {
                mask = dilate(geometry, &mask);
            }

            if let Some(cut_radius_deg) = self.config.cut_radius_deg {
                let focal = telescope.optics.effective_focal_length;
                let fov = self
                    .fov_masks
                    .entry(tel_id)
                    .or_insert_with(|| cut_pixel_distance(geometry, focal, cut_radius_deg));
                for (m, &keep) in mask.iter_mut().zip(fov.iter()) {
                    *m = *m && keep;
                }
            }

            camera_data.image_parameters =
                parameterize(geometry, &camera_data.image, &mask);

            if let Some(simulation) = &event.simulation {
                let pointing = event
                    .pointing
                    .as_ref()
                    .and_then(|p| p.tels.get(&tel_id).copied().map(|t| (t.altitude, t.azimuth)))
                    .or_else(|| {
                        event
                            .pointing
                            .as_ref()
                            .map(|p| (p.array_altitude, p.array_azimuth))
                    });
                if let (Some((alt, az)), Some(truth)) = (pointing, simulation.tels.get(&tel_id))
                {
                    let hillas = camera_data.image_parameters.hillas;
                    camera_data.image_parameters.extra = compute_extras(
                        geometry,
                        &hillas,
                        truth.true_image.as_slice(),
                        telescope.optics.effective_focal_length,
                        Horizontal::new(alt, az),
                        Horizontal::new(simulation.shower.alt, simulation.shower.az),
                    );
                }
            }

            camera_data.mask = mask;
        }

        event.dl1 = Some(dl1);
    }

    /// Build DL1 images from true photo-electron counts plus Poisson
    /// night-sky background, keeping only telescopes that pass a
    /// minimal trigger.
    fn synthesize_from_truth(&self, event: &mut ArrayEvent) {
        let Some(simulation) = &event.simulation else {
            return;
        };
        let mut rng = rand::thread_rng();
        let noise = self.config.poisson_noise;
        let mut dl1 = showerpipe_core::event::Dl1Event::default();

        for (&tel_id, truth) in &simulation.tels {
            let image: Vec<f64> = truth
                .true_image
                .iter()
                .map(|&pe| {
                    let lambda = pe.max(0) as f64 + noise;
                    let sampled = if lambda > 0.0 {
                        Poisson::new(lambda).map_or(lambda, |p| p.sample(&mut rng))
                    } else {
                        0.0
                    };
                    sampled - noise
                })
                .collect();

            if !fake_trigger(&image, self.config.tailcuts.picture_thresh, 4) {
                debug!("event {}: telescope {tel_id} fails fake trigger", event.event_id);
                continue;
            }

            let n = image.len();
            dl1.tels.insert(
                tel_id,
                Dl1Camera {
                    image,
                    peak_time: vec![0.0; n],
                    mask: Vec::new(),
                    image_parameters: Default::default(),
                },
            );
        }

        if !dl1.tels.is_empty() {
            event.dl1 = Some(dl1);
        }
    }
}

/// Require a minimum number of pixels above threshold.
fn fake_trigger(image: &[f64], threshold: f64, min_pixels_above: usize) -> bool {
    image.iter().filter(|&&v| v >= threshold).count() >= min_pixels_above
}

/// Full parameterization of a cleaned image.
///
/// Emits the NaN-filled default when fewer than three pixels survive or
/// the surviving charge is not positive.
#[must_use]
pub fn parameterize(
    camera: &CameraGeometry,
    image: &[f64],
    mask: &[bool],
) -> ImageParameters {
    let survivors = mask.iter().filter(|&&m| m).count();
    let charge: f64 = image
        .iter()
        .zip(mask)
        .filter_map(|(&v, &m)| m.then_some(v))
        .sum();
    if survivors < MIN_PIXELS || charge <= 0.0 {
        return ImageParameters::default();
    }

    let hillas = hillas_parameters(camera, image, mask);
    ImageParameters {
        hillas,
        leakage: leakage_parameters(camera, image, mask),
        concentration: concentration_parameters(camera, image, mask, &hillas),
        morphology: morphology_parameters(camera, mask),
        intensity: intensity_parameters(image, mask),
        extra: None,
    }
}

/// Truth-dependent parameters: source position in the camera and the
/// comparison against the true-image moments.
fn compute_extras(
    camera: &CameraGeometry,
    hillas: &HillasParameters,
    true_image: &[i32],
    focal_length: f64,
    pointing: Horizontal,
    true_direction: Horizontal,
) -> Option<ExtraParameters> {
    if !hillas.intensity.is_finite() {
        return None;
    }
    let frame = NominalFrame::new(pointing);
    let (xi, eta) = frame.sky_to_nominal(&true_direction)?;
    let source_x = xi * focal_length;
    let source_y = eta * focal_length;

    let dx = source_x - hillas.x;
    let dy = source_y - hillas.y;
    let disp = (dx * dx + dy * dy).sqrt();
    let true_psi = dy.atan2(dx);
    let (sin_psi, cos_psi) = hillas.psi.sin_cos();
    let miss = (-sin_psi * dx + cos_psi * dy).abs();
    let theta = fold_axis_angle(true_psi - hillas.psi);

    let mut extras = ExtraParameters {
        miss,
        disp,
        theta,
        true_psi,
        ..Default::default()
    };

    if true_image.len() == camera.num_pixels {
        let true_f64: Vec<f64> = true_image.iter().map(|&pe| pe.max(0) as f64).collect();
        let true_mask: Vec<bool> = true_f64.iter().map(|&v| v > 0.0).collect();
        let true_hillas = hillas_parameters(camera, &true_f64, &true_mask);
        if true_hillas.intensity.is_finite() {
            extras.cog_err =
                ((hillas.x - true_hillas.x).powi(2) + (hillas.y - true_hillas.y).powi(2)).sqrt();
            extras.beta_err = fold_axis_angle(hillas.psi - true_hillas.psi);
        }
    }

    Some(extras)
}

/// Fold an axis-angle difference into [0, pi/2]; axes have no sign.
fn fold_axis_angle(angle: f64) -> f64 {
    let mut a = angle.abs() % std::f64::consts::PI;
    if a > std::f64::consts::FRAC_PI_2 {
        a = std::f64::consts::PI - a;
    }
    a
}
