//! R1 -> DL1 calibration: charge extraction plus gain application.

use log::debug;
use serde::Deserialize;

use showerpipe_core::error::{EventError, GeometryError};
use showerpipe_core::{ArrayEvent, Dl1Camera, SubarrayDescription};

use crate::extractor::{ImageExtractor, LocalPeakConfig, LocalPeakExtractor};

/// Calibrator configuration, one section of the pipeline JSON.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalibratorConfig {
    /// Extractor algorithm name.
    pub image_extractor_type: String,
    /// Settings for the local-peak extractor.
    #[serde(rename = "LocalPeakExtractor")]
    pub local_peak: LocalPeakConfig,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            image_extractor_type: "LocalPeakExtractor".to_string(),
            local_peak: LocalPeakConfig::default(),
        }
    }
}

/// Fills DL1 images from R1 waveforms.
#[derive(Debug)]
pub struct Calibrator {
    extractor: Box<dyn ImageExtractor>,
}

impl Calibrator {
    /// Build the configured extractor.
    ///
    /// # Errors
    /// Fails on an unknown extractor name or invalid window settings.
    pub fn new(config: &CalibratorConfig) -> showerpipe_core::Result<Self> {
        let extractor: Box<dyn ImageExtractor> = match config.image_extractor_type.as_str() {
            "LocalPeakExtractor" => Box::new(LocalPeakExtractor::new(config.local_peak)?),
            other => {
                return Err(showerpipe_core::ConfigError::UnknownName {
                    kind: "image extractor",
                    name: other.to_string(),
                }
                .into())
            }
        };
        Ok(Self { extractor })
    }

    /// Calibrate every telescope with R1 data, producing the DL1 layer.
    ///
    /// Events that already carry DL1 (e.g. replayed output) pass
    /// through untouched. Monitor gains are applied per pixel when
    /// present.
    ///
    /// # Errors
    /// `EventError` for telescope/camera mismatches; `GeometryError`
    /// when calibration produces a non-finite total charge, which
    /// aborts the file.
    pub fn apply(
        &self,
        subarray: &SubarrayDescription,
        event: &mut ArrayEvent,
    ) -> showerpipe_core::Result<()> {
        if event.dl1.is_some() {
            return Ok(());
        }
        let Some(r1) = event.r1.take() else {
            return Err(EventError::MissingLayer {
                event_id: event.event_id,
                layer: "r1",
            }
            .into());
        };

        let result = (|| -> showerpipe_core::Result<()> {
            for (&tel_id, r1_camera) in &r1.tels {
                let telescope = subarray
                    .tels
                    .get(&tel_id)
                    .ok_or(EventError::UnknownTelescope { tel_id })?;
                let readout = &telescope.camera.readout;
                let n_pixels = telescope.camera.geometry.num_pixels;
                if r1_camera.waveform.nrows() != n_pixels {
                    return Err(EventError::MalformedTelescope {
                        tel_id,
                        message: format!(
                            "waveform has {} rows, camera has {} pixels",
                            r1_camera.waveform.nrows(),
                            n_pixels
                        ),
                    }
                    .into());
                }

                let mut extracted = self.extractor.extract(&r1_camera.waveform, readout);

                if let Some(monitor) = event
                    .monitor
                    .as_ref()
                    .and_then(|monitor| monitor.tels.get(&tel_id))
                    .filter(|monitor| monitor.n_channels > 0)
                {
                    for (pixel, charge) in extracted.image.iter_mut().enumerate() {
                        let channel = r1_camera
                            .gain_selection
                            .get(pixel)
                            .copied()
                            .unwrap_or(0)
                            .clamp(0, monitor.n_channels as i32 - 1)
                            as usize;
                        *charge *= monitor.dc_to_pe[[channel, pixel]];
                    }
                }

                let total: f64 = extracted.image.iter().sum();
                if !total.is_finite() {
                    return Err(GeometryError::NonFiniteIntensity { tel_id }.into());
                }

                debug!(
                    "calibrated tel {tel_id}: {} pixels, {:.1} p.e. total",
                    n_pixels, total
                );
                event.dl1_mut().tels.insert(
                    tel_id,
                    Dl1Camera {
                        image: extracted.image,
                        peak_time: extracted.peak_time,
                        mask: Vec::new(),
                        image_parameters: Default::default(),
                    },
                );
            }
            Ok(())
        })();

        event.r1 = Some(r1);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use showerpipe_core::{
        CameraDescription, CameraGeometry, CameraReadout, OpticsDescription, R1Camera, R1Event,
        TelescopeDescription,
    };

    fn subarray_one_tel() -> SubarrayDescription {
        let geometry = CameraGeometry::rectangular("cam", 2, 2).unwrap();
        let readout = CameraReadout {
            camera_name: "cam".to_string(),
            n_samples: 16,
            sampling_rate: 1.0,
            n_channels: 1,
            n_pixels: 4,
            reference_pulse_shape: Array2::zeros((1, 0)),
            reference_pulse_sample_width: 1.0,
        };
        let mut subarray = SubarrayDescription::new("array", [0.0; 3]);
        subarray.add_telescope(
            1,
            TelescopeDescription {
                tel_name: "TEL".to_string(),
                camera: CameraDescription { geometry, readout },
                optics: OpticsDescription {
                    optics_name: "optics".to_string(),
                    mirror_area: 100.0,
                    equivalent_focal_length: 16.0,
                    effective_focal_length: 16.0,
                    num_mirrors: 1,
                },
            },
            [0.0; 3],
        );
        subarray
    }

    fn r1_event(n_pixels: usize) -> ArrayEvent {
        let mut waveform = Array2::zeros((n_pixels, 16));
        for pixel in 0..n_pixels {
            waveform[[pixel, 8]] = (pixel + 1) as f64;
        }
        let mut event = ArrayEvent::new(1, 1);
        let mut r1 = R1Event::default();
        r1.tels.insert(
            1,
            R1Camera {
                waveform,
                gain_selection: vec![0; n_pixels],
            },
        );
        event.r1 = Some(r1);
        event
    }

    #[test]
    fn test_calibration_fills_dl1() {
        let subarray = subarray_one_tel();
        let calibrator = Calibrator::new(&CalibratorConfig {
            local_peak: LocalPeakConfig {
                apply_correction: false,
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();
        let mut event = r1_event(4);
        calibrator.apply(&subarray, &mut event).unwrap();

        let dl1 = event.dl1.as_ref().unwrap();
        let camera = &dl1.tels[&1];
        assert_eq!(camera.image.len(), 4);
        assert_relative_eq!(camera.image[3], 4.0);
        assert!(camera.mask.is_empty());
        // R1 stays in place for downstream writers.
        assert!(event.r1.is_some());
    }

    #[test]
    fn test_missing_r1_is_event_error() {
        let subarray = subarray_one_tel();
        let calibrator = Calibrator::new(&CalibratorConfig::default()).unwrap();
        let mut event = ArrayEvent::new(9, 1);
        let err = calibrator.apply(&subarray, &mut event).unwrap_err();
        assert!(matches!(err, Error::Event(EventError::MissingLayer { .. })));
    }

    #[test]
    fn test_pixel_mismatch_is_event_error() {
        let subarray = subarray_one_tel();
        let calibrator = Calibrator::new(&CalibratorConfig::default()).unwrap();
        let mut event = r1_event(5);
        let err = calibrator.apply(&subarray, &mut event).unwrap_err();
        assert!(matches!(
            err,
            Error::Event(EventError::MalformedTelescope { .. })
        ));
    }

    #[test]
    fn test_unknown_extractor_rejected() {
        let err = Calibrator::new(&CalibratorConfig {
            image_extractor_type: "GlobalPeakExtractor".to_string(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(showerpipe_core::ConfigError::UnknownName { .. })
        ));
    }
}
