//! Charge extraction from calibrated waveforms.

use ndarray::Array2;
use serde::Deserialize;

use showerpipe_core::error::ConfigError;
use showerpipe_core::CameraReadout;

/// Configuration for [`LocalPeakExtractor`].
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalPeakConfig {
    /// Samples the window start sits before the peak.
    pub window_shift: usize,
    /// Window length in samples.
    pub window_width: usize,
    /// Scale charges by the pulse-containment correction derived from
    /// the reference pulse shape.
    pub apply_correction: bool,
}

impl Default for LocalPeakConfig {
    fn default() -> Self {
        Self {
            window_shift: 3,
            window_width: 7,
            apply_correction: true,
        }
    }
}

impl LocalPeakConfig {
    /// Reject zero-width windows.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_width == 0 {
            return Err(ConfigError::InvalidValue {
                key: "window_width",
                message: "window width must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Extracted charge and arrival time per pixel.
#[derive(Clone, Debug)]
pub struct ExtractedImage {
    /// Charge estimate (photo-electrons).
    pub image: Vec<f64>,
    /// Pulse time (ns).
    pub peak_time: Vec<f64>,
}

/// Trait for waveform charge extractors.
pub trait ImageExtractor: std::fmt::Debug + Send + Sync {
    /// Algorithm name for configuration lookup.
    fn name(&self) -> &'static str;

    /// Extract charge and peak time from an n_pixels x n_samples
    /// waveform.
    fn extract(&self, waveform: &Array2<f64>, readout: &CameraReadout) -> ExtractedImage;
}

/// Sliding-window extractor around each pixel's own peak sample.
#[derive(Clone, Debug, Default)]
pub struct LocalPeakExtractor {
    config: LocalPeakConfig,
}

impl LocalPeakExtractor {
    /// Create with a validated configuration.
    pub fn new(config: LocalPeakConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &LocalPeakConfig {
        &self.config
    }

    /// Fraction of the reference pulse the window captures, inverted.
    ///
    /// Falls back to 1.0 when the readout carries no pulse shape.
    fn containment_correction(&self, readout: &CameraReadout) -> f64 {
        let shape = &readout.reference_pulse_shape;
        if shape.is_empty() {
            return 1.0;
        }
        let pulse = shape.row(0);
        let total: f64 = pulse.sum();
        if total <= 0.0 {
            return 1.0;
        }
        let peak = pulse
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);

        // The pulse shape is sampled on its own grid; rescale the
        // window to pulse-shape samples.
        let ratio = if readout.reference_pulse_sample_width > 0.0 && readout.sampling_rate > 0.0 {
            (1.0 / readout.sampling_rate) / readout.reference_pulse_sample_width
        } else {
            1.0
        };
        let shift = (self.config.window_shift as f64 * ratio).round() as usize;
        let width = ((self.config.window_width as f64 * ratio).round() as usize).max(1);

        let start = peak.saturating_sub(shift);
        let end = (start + width).min(pulse.len());
        let contained: f64 = pulse.iter().skip(start).take(end - start).sum();
        if contained > 0.0 {
            total / contained
        } else {
            1.0
        }
    }
}

impl ImageExtractor for LocalPeakExtractor {
    fn name(&self) -> &'static str {
        "LocalPeakExtractor"
    }

    fn extract(&self, waveform: &Array2<f64>, readout: &CameraReadout) -> ExtractedImage {
        let n_pixels = waveform.nrows();
        let n_samples = waveform.ncols();
        let ns_per_sample = if readout.sampling_rate > 0.0 {
            1.0 / readout.sampling_rate
        } else {
            1.0
        };
        let correction = if self.config.apply_correction {
            self.containment_correction(readout)
        } else {
            1.0
        };

        let mut image = Vec::with_capacity(n_pixels);
        let mut peak_time = Vec::with_capacity(n_pixels);

        for pixel in 0..n_pixels {
            let row = waveform.row(pixel);
            let peak = row
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap_or(0);

            let start = peak.saturating_sub(self.config.window_shift);
            let end = (start + self.config.window_width).min(n_samples);

            let mut charge = 0.0;
            let mut weighted_time = 0.0;
            for sample in start..end {
                charge += row[sample];
                weighted_time += row[sample] * sample as f64;
            }
            let time = if charge > 0.0 {
                weighted_time / charge * ns_per_sample
            } else {
                peak as f64 * ns_per_sample
            };

            image.push(charge * correction);
            peak_time.push(time);
        }

        ExtractedImage { image, peak_time }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn readout(n_pixels: usize, n_samples: usize) -> CameraReadout {
        CameraReadout {
            camera_name: "cam".to_string(),
            n_samples,
            sampling_rate: 1.0,
            n_channels: 1,
            n_pixels,
            reference_pulse_shape: Array2::zeros((1, 0)),
            reference_pulse_sample_width: 1.0,
        }
    }

    #[test]
    fn test_window_sums_around_peak() {
        let mut waveform = Array2::zeros((1, 20));
        waveform[[0, 10]] = 8.0;
        waveform[[0, 9]] = 4.0;
        waveform[[0, 11]] = 4.0;
        let extractor = LocalPeakExtractor::new(LocalPeakConfig {
            window_shift: 3,
            window_width: 7,
            apply_correction: false,
        })
        .unwrap();
        let out = extractor.extract(&waveform, &readout(1, 20));
        assert_relative_eq!(out.image[0], 16.0);
        assert_relative_eq!(out.peak_time[0], 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_window_clipped_at_trace_start() {
        let mut waveform = Array2::zeros((1, 20));
        waveform[[0, 0]] = 5.0;
        let extractor = LocalPeakExtractor::new(LocalPeakConfig {
            window_shift: 3,
            window_width: 7,
            apply_correction: false,
        })
        .unwrap();
        let out = extractor.extract(&waveform, &readout(1, 20));
        assert_relative_eq!(out.image[0], 5.0);
    }

    #[test]
    fn test_flat_trace_has_defined_time() {
        let waveform = Array2::zeros((1, 16));
        let extractor = LocalPeakExtractor::default();
        let out = extractor.extract(&waveform, &readout(1, 16));
        assert_relative_eq!(out.image[0], 0.0);
        assert!(out.peak_time[0].is_finite());
    }

    #[test]
    fn test_containment_correction_scales_up() {
        // A pulse wider than the window: correction must exceed 1.
        let mut readout = readout(1, 30);
        let mut pulse = Array2::zeros((1, 30));
        for (i, value) in pulse.row_mut(0).iter_mut().enumerate() {
            let t = i as f64 - 15.0;
            *value = (-0.5 * (t / 6.0).powi(2)).exp();
        }
        readout.reference_pulse_shape = pulse;

        let mut waveform = Array2::zeros((1, 30));
        waveform[[0, 15]] = 10.0;

        let with = LocalPeakExtractor::new(LocalPeakConfig {
            window_shift: 3,
            window_width: 7,
            apply_correction: true,
        })
        .unwrap();
        let without = LocalPeakExtractor::new(LocalPeakConfig {
            window_shift: 3,
            window_width: 7,
            apply_correction: false,
        })
        .unwrap();
        let corrected = with.extract(&waveform, &readout);
        let raw = without.extract(&waveform, &readout);
        assert!(corrected.image[0] > raw.image[0]);
    }

    #[test]
    fn test_zero_window_rejected() {
        let err = LocalPeakExtractor::new(LocalPeakConfig {
            window_shift: 0,
            window_width: 0,
            apply_correction: false,
        })
        .unwrap_err();
        assert!(matches!(
            err,
            showerpipe_core::ConfigError::InvalidValue { .. }
        ));
    }
}
