//! The in-memory array event, mutated in place through the pipeline.
//!
//! Data levels are tagged options rather than a class hierarchy: a stage
//! checks presence before dispatching. Per-telescope records live in
//! `BTreeMap`s so iteration order is stable.

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::dl2::Dl2Event;
use crate::params::ImageParameters;
use crate::simulation::SimulationEvent;
use crate::subarray::TelId;

/// Raw two-gain waveforms for one telescope.
#[derive(Clone, Debug)]
pub struct R0Camera {
    /// Low- and high-gain waveforms, each n_pixels x n_samples.
    pub waveform: [Array2<u16>; 2],
}

/// Gain-selected, pedestal-corrected waveforms for one telescope.
#[derive(Clone, Debug)]
pub struct R1Camera {
    /// Calibrated waveform, n_pixels x n_samples.
    pub waveform: Array2<f64>,
    /// Selected gain channel per pixel.
    pub gain_selection: Vec<i32>,
}

/// Reduced waveform data for one telescope.
#[derive(Clone, Debug)]
pub struct Dl0Camera {
    /// Charge estimate per pixel (photo-electrons).
    pub image: Vec<f64>,
    /// Pulse arrival time per pixel (ns).
    pub peak_time: Vec<f64>,
}

/// Calibrated image plus cleaning products for one telescope.
///
/// Produced by the image processor; read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct Dl1Camera {
    /// Charge estimate per pixel (photo-electrons).
    pub image: Vec<f64>,
    /// Pulse arrival time per pixel (ns).
    pub peak_time: Vec<f64>,
    /// Cleaning survival mask.
    pub mask: Vec<bool>,
    /// Parameterization of the cleaned image.
    pub image_parameters: ImageParameters,
}

/// Calibration monitoring data for one telescope.
#[derive(Clone, Debug)]
pub struct TelescopeMonitor {
    /// Gain channels.
    pub n_channels: usize,
    /// Pixels.
    pub n_pixels: usize,
    /// Conversion factor digital counts -> photo-electrons, per channel
    /// and pixel.
    pub dc_to_pe: Array2<f64>,
    /// Pedestal level per channel and pixel, per sample.
    pub pedestal_per_sample: Array2<f64>,
}

/// Telescope drive orientation.
#[derive(Clone, Copy, Debug)]
pub struct TelescopePointing {
    /// Altitude (radians).
    pub altitude: f64,
    /// Azimuth (radians).
    pub azimuth: f64,
}

/// Array and per-telescope pointing for one event.
#[derive(Clone, Debug, Default)]
pub struct PointingEvent {
    /// Array pointing altitude (radians).
    pub array_altitude: f64,
    /// Array pointing azimuth (radians).
    pub array_azimuth: f64,
    /// Per-telescope pointing.
    pub tels: BTreeMap<TelId, TelescopePointing>,
}

/// Per-telescope container for a data level.
#[derive(Clone, Debug)]
pub struct TelescopeFrameSet<T> {
    pub tels: BTreeMap<TelId, T>,
}

impl<T> Default for TelescopeFrameSet<T> {
    fn default() -> Self {
        Self {
            tels: BTreeMap::new(),
        }
    }
}

/// R0 data level.
pub type R0Event = TelescopeFrameSet<R0Camera>;
/// R1 data level.
pub type R1Event = TelescopeFrameSet<R1Camera>;
/// DL0 data level.
pub type Dl0Event = TelescopeFrameSet<Dl0Camera>;
/// DL1 data level.
pub type Dl1Event = TelescopeFrameSet<Dl1Camera>;
/// Monitoring data.
pub type MonitorEvent = TelescopeFrameSet<TelescopeMonitor>;

/// One array-wide event carrying every populated data level.
#[derive(Clone, Debug, Default)]
pub struct ArrayEvent {
    /// Event identifier, unique within a run.
    pub event_id: u64,
    /// Run identifier.
    pub run_id: u32,
    pub r0: Option<R0Event>,
    pub r1: Option<R1Event>,
    pub dl0: Option<Dl0Event>,
    pub dl1: Option<Dl1Event>,
    pub dl2: Option<Dl2Event>,
    pub simulation: Option<SimulationEvent>,
    pub pointing: Option<PointingEvent>,
    pub monitor: Option<MonitorEvent>,
}

impl ArrayEvent {
    /// Create an event with ids and no data levels.
    #[must_use]
    pub fn new(event_id: u64, run_id: u32) -> Self {
        Self {
            event_id,
            run_id,
            ..Default::default()
        }
    }

    /// DL1 level, created on first use.
    pub fn dl1_mut(&mut self) -> &mut Dl1Event {
        self.dl1.get_or_insert_with(Default::default)
    }

    /// DL2 level, created on first use.
    pub fn dl2_mut(&mut self) -> &mut Dl2Event {
        self.dl2.get_or_insert_with(Default::default)
    }
}
