//! showerpipe-algorithms: Image cleaning, parameterization, and
//! calibration.
//!
//! This crate turns calibrated camera images into DL1 products: the
//! tailcuts cleaning mask, Hillas moments, leakage, concentration,
//! morphology and intensity statistics, plus the waveform extraction
//! that produces the images in the first place.

pub mod calibrate;
pub mod cleaning;
pub mod concentration;
pub mod extractor;
pub mod leakage;
pub mod moments;
pub mod morphology;
pub mod processor;
pub mod query;

pub use calibrate::{Calibrator, CalibratorConfig};
pub use cleaning::{dilate, tailcuts_clean, ImageCleaner, TailcutsCleaner, TailcutsConfig};
pub use concentration::concentration_parameters;
pub use extractor::{ExtractedImage, ImageExtractor, LocalPeakConfig, LocalPeakExtractor};
pub use leakage::leakage_parameters;
pub use moments::{hillas_parameters, intensity_parameters};
pub use morphology::morphology_parameters;
pub use processor::{cut_pixel_distance, parameterize, ImageProcessor, ImageProcessorConfig};
pub use query::ImageQuery;
