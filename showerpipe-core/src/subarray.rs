//! Telescope and subarray descriptions.
//!
//! A `SubarrayDescription` is built once per input file and shared by
//! reference across all processors; nothing mutates it afterwards.

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::camera::CameraGeometry;

/// Telescope identifier.
pub type TelId = u32;

/// Mirror and focal-length description of a telescope's optics.
#[derive(Clone, Debug)]
pub struct OpticsDescription {
    /// Optics model name.
    pub optics_name: String,
    /// Total mirror area (m^2).
    pub mirror_area: f64,
    /// Nominal focal length (m).
    pub equivalent_focal_length: f64,
    /// Focal length corrected for coma aberration (m); used for the
    /// camera-to-angle conversion.
    pub effective_focal_length: f64,
    /// Number of mirror facets.
    pub num_mirrors: u32,
}

/// Sampling description of the camera electronics.
#[derive(Clone, Debug)]
pub struct CameraReadout {
    /// Camera model name.
    pub camera_name: String,
    /// Samples per waveform.
    pub n_samples: usize,
    /// Sampling rate (GHz).
    pub sampling_rate: f64,
    /// Gain channels.
    pub n_channels: usize,
    /// Pixels read out.
    pub n_pixels: usize,
    /// Reference single-p.e. pulse shape, one row per channel.
    pub reference_pulse_shape: Array2<f64>,
    /// Sample width of the reference pulse shape (ns).
    pub reference_pulse_sample_width: f64,
}

/// Camera geometry plus readout.
#[derive(Clone, Debug)]
pub struct CameraDescription {
    pub geometry: CameraGeometry,
    pub readout: CameraReadout,
}

/// One telescope: camera and optics.
#[derive(Clone, Debug)]
pub struct TelescopeDescription {
    /// Telescope model name.
    pub tel_name: String,
    pub camera: CameraDescription,
    pub optics: OpticsDescription,
}

/// The telescope array: descriptions and ground positions.
#[derive(Clone, Debug, Default)]
pub struct SubarrayDescription {
    /// Array name.
    pub name: String,
    /// Telescope descriptions keyed by id.
    pub tels: BTreeMap<TelId, TelescopeDescription>,
    /// Telescope positions in the local ground frame (meters).
    pub tel_positions: BTreeMap<TelId, [f64; 3]>,
    /// Reference position of the array.
    pub reference_position: [f64; 3],
}

impl SubarrayDescription {
    /// Create an empty subarray with a name.
    pub fn new(name: impl Into<String>, reference_position: [f64; 3]) -> Self {
        Self {
            name: name.into(),
            tels: BTreeMap::new(),
            tel_positions: BTreeMap::new(),
            reference_position,
        }
    }

    /// Register a telescope.
    pub fn add_telescope(
        &mut self,
        tel_id: TelId,
        description: TelescopeDescription,
        position: [f64; 3],
    ) {
        self.tels.insert(tel_id, description);
        self.tel_positions.insert(tel_id, position);
    }

    /// Telescope ids in ascending order.
    #[must_use]
    pub fn ordered_tel_ids(&self) -> Vec<TelId> {
        self.tels.keys().copied().collect()
    }

    /// Number of telescopes.
    #[must_use]
    pub fn num_tels(&self) -> usize {
        self.tels.len()
    }
}
