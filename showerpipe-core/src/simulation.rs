//! Simulation truth, run configuration, and the atmosphere profile.

use std::collections::BTreeMap;

use crate::subarray::TelId;

/// True shower parameters for one simulated event.
#[derive(Clone, Copy, Debug)]
pub struct SimulatedShower {
    /// Primary energy (TeV).
    pub energy: f64,
    /// True altitude (radians).
    pub alt: f64,
    /// True azimuth (radians).
    pub az: f64,
    /// True core x (meters).
    pub core_x: f64,
    /// True core y (meters).
    pub core_y: f64,
    /// Height of first interaction (meters).
    pub h_first_int: f64,
    /// True depth of shower maximum (g/cm^2).
    pub x_max: f64,
    /// Primary particle id (0 = gamma, 101 = proton, ...).
    pub primary_id: i32,
}

impl Default for SimulatedShower {
    fn default() -> Self {
        Self {
            energy: f64::NAN,
            alt: f64::NAN,
            az: f64::NAN,
            core_x: f64::NAN,
            core_y: f64::NAN,
            h_first_int: f64::NAN,
            x_max: f64::NAN,
            primary_id: -1,
        }
    }
}

/// Noise-free truth for one telescope camera.
#[derive(Clone, Debug)]
pub struct SimulatedCamera {
    /// True photo-electron count per pixel.
    pub true_image: Vec<i32>,
    /// True impact distance of the shower axis from this telescope
    /// (meters).
    pub impact_distance: f64,
}

/// Simulation layer of an event.
#[derive(Clone, Debug, Default)]
pub struct SimulationEvent {
    /// True shower.
    pub shower: SimulatedShower,
    /// Per-telescope truth.
    pub tels: BTreeMap<TelId, SimulatedCamera>,
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self {
            true_image: Vec::new(),
            impact_distance: f64::NAN,
        }
    }
}

/// Column-oriented truth for every simulated shower in a run, thrown or
/// triggered; used for efficiency denominators at close time.
#[derive(Clone, Debug, Default)]
pub struct ShowerArray {
    pub energy: Vec<f64>,
    pub alt: Vec<f64>,
    pub az: Vec<f64>,
    pub core_x: Vec<f64>,
    pub core_y: Vec<f64>,
    pub x_max: Vec<f64>,
}

impl ShowerArray {
    /// Append one shower.
    pub fn push(&mut self, shower: &SimulatedShower) {
        self.energy.push(shower.energy);
        self.alt.push(shower.alt);
        self.az.push(shower.az);
        self.core_x.push(shower.core_x);
        self.core_y.push(shower.core_y);
        self.x_max.push(shower.x_max);
    }

    /// Number of showers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.energy.len()
    }

    /// Whether the array is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.energy.is_empty()
    }
}

/// Simulation run header.
#[derive(Clone, Debug, Default)]
pub struct SimulationConfig {
    pub run_number: i32,
    pub energy_range_min: f64,
    pub energy_range_max: f64,
    pub spectral_index: f64,
    pub n_showers: i32,
    pub shower_reuse: i32,
    pub max_alt: f64,
    pub min_alt: f64,
    pub max_az: f64,
    pub min_az: f64,
    pub diffuse: i32,
    pub max_viewcone_radius: f64,
    pub min_viewcone_radius: f64,
    pub max_scatter_range: f64,
    pub min_scatter_range: f64,
    pub core_pos_mode: i32,
    pub atmosphere: i32,
    pub prod_site_alt: f64,
}

/// Tabulated atmosphere profile.
///
/// Rows are sorted by ascending altitude. Interpolation between rows is
/// linear; the exact profile interpolator is an external collaborator
/// and only this table travels with the output.
#[derive(Clone, Debug, Default)]
pub struct AtmosphereModel {
    /// Altitude above sea level (km).
    pub alt_km: Vec<f64>,
    /// Density (g/cm^3).
    pub rho: Vec<f64>,
    /// Vertical column thickness from space down to the row altitude
    /// (g/cm^2).
    pub thick: Vec<f64>,
    /// Refraction index minus one.
    pub refidx_m1: Vec<f64>,
}

impl AtmosphereModel {
    /// Vertical column thickness at a height above sea level, in
    /// g/cm^2, linearly interpolated and clamped to the table range.
    ///
    /// Returns `None` when the table is empty.
    #[must_use]
    pub fn thickness_at(&self, height_m: f64) -> Option<f64> {
        if self.alt_km.is_empty() || self.alt_km.len() != self.thick.len() {
            return None;
        }
        let alt_km = height_m / 1000.0;
        let first = self.alt_km[0];
        let last = self.alt_km[self.alt_km.len() - 1];
        if alt_km <= first {
            return Some(self.thick[0]);
        }
        if alt_km >= last {
            return Some(self.thick[self.thick.len() - 1]);
        }
        let idx = self
            .alt_km
            .partition_point(|&a| a <= alt_km)
            .saturating_sub(1);
        let (a0, a1) = (self.alt_km[idx], self.alt_km[idx + 1]);
        let (t0, t1) = (self.thick[idx], self.thick[idx + 1]);
        let frac = (alt_km - a0) / (a1 - a0);
        Some(t0 + frac * (t1 - t0))
    }
}
