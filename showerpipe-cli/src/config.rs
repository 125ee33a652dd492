//! Pipeline configuration document.
//!
//! One JSON object with a section per component; every field has a
//! default, unknown keys are rejected.

use serde::Deserialize;

use showerpipe_algorithms::{CalibratorConfig, ImageProcessorConfig};
use showerpipe_io::DataWriterConfig;
use showerpipe_reco::ShowerProcessorConfig;

/// Root configuration for the processing pipeline.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub calibrator: CalibratorConfig,
    pub image_processor: ImageProcessorConfig,
    pub shower_processor: ShowerProcessorConfig,
    pub data_writer: DataWriterConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_conventions() {
        let config = PipelineConfig::default();
        assert_eq!(config.calibrator.image_extractor_type, "LocalPeakExtractor");
        assert_eq!(config.calibrator.local_peak.window_shift, 3);
        assert_eq!(config.calibrator.local_peak.window_width, 7);
        assert_eq!(config.image_processor.image_cleaner_type, "Tailcuts_cleaner");
        assert_eq!(
            config.shower_processor.geometry_reconstruction_types,
            vec!["HillasReconstructor".to_string()]
        );
        assert_eq!(config.data_writer.output_type, "hdf5");
        assert!(config.data_writer.write_dl1);
        assert!(config.data_writer.write_dl2);
        assert!(!config.data_writer.write_r0);
    }

    #[test]
    fn test_parse_full_document() {
        let text = r#"{
            "calibrator": {
                "image_extractor_type": "LocalPeakExtractor",
                "LocalPeakExtractor": {
                    "window_shift": 4,
                    "window_width": 8,
                    "apply_correction": false
                }
            },
            "image_processor": {
                "poisson_noise": 5.0,
                "image_cleaner_type": "Tailcuts_cleaner",
                "TailcutsCleaner": {
                    "picture_thresh": 15.0,
                    "boundary_thresh": 7.5,
                    "keep_isolated_pixels": false,
                    "min_number_picture_neighbors": 2
                }
            },
            "shower_processor": {
                "GeometryReconstructionTypes": ["HillasReconstructor"],
                "HillasReconstructor": {
                    "ImageQuery": "hillas_intensity > 50",
                    "use_fake_hillas": true
                }
            },
            "data_writer": {
                "output_type": "hdf5",
                "overwrite": false,
                "write_dl1_image": false
            }
        }"#;
        let config: PipelineConfig = serde_json::from_str(text).unwrap();
        assert_eq!(config.calibrator.local_peak.window_shift, 4);
        assert!(!config.calibrator.local_peak.apply_correction);
        assert_eq!(config.image_processor.tailcuts.picture_thresh, 15.0);
        assert_eq!(config.image_processor.tailcuts.boundary_thresh, 7.5);
        assert_eq!(config.shower_processor.hillas.image_query, "hillas_intensity > 50");
        assert!(config.shower_processor.hillas.use_fake_hillas);
        assert!(!config.data_writer.overwrite);
        assert!(!config.data_writer.write_dl1_image);
        // Untouched sections keep defaults.
        assert!(config.data_writer.write_dl2);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let text = r#"{ "image_procesor": {} }"#;
        assert!(serde_json::from_str::<PipelineConfig>(text).is_err());

        let nested = r#"{ "image_processor": { "poison_noise": 5 } }"#;
        assert!(serde_json::from_str::<PipelineConfig>(nested).is_err());
    }
}
