//! Reconstructed physics quantities (DL2).

use std::collections::BTreeMap;

use crate::subarray::TelId;

/// Stereo geometry solution for one event from one reconstructor.
#[derive(Clone, Debug)]
pub struct ReconstructedGeometry {
    /// Whether the fit converged; all other fields are meaningful only
    /// when set.
    pub is_valid: bool,
    /// Reconstructed altitude (radians).
    pub alt: f64,
    /// Reconstructed azimuth (radians).
    pub az: f64,
    /// Altitude uncertainty (radians).
    pub alt_uncertainty: f64,
    /// Azimuth uncertainty (radians).
    pub az_uncertainty: f64,
    /// Core impact x in the ground frame (meters).
    pub core_x: f64,
    /// Core impact y in the ground frame (meters).
    pub core_y: f64,
    /// Core position error (meters).
    pub core_pos_error: f64,
    /// Height of shower maximum above the observation level (meters).
    pub hmax: f64,
    /// Atmospheric depth of shower maximum (g/cm^2).
    pub xmax: f64,
    /// Angular separation to the true direction, when truth is known
    /// (radians).
    pub direction_error: f64,
    /// Telescopes that contributed to the fit.
    pub telescopes: Vec<TelId>,
}

impl Default for ReconstructedGeometry {
    fn default() -> Self {
        Self {
            is_valid: false,
            alt: f64::NAN,
            az: f64::NAN,
            alt_uncertainty: f64::NAN,
            az_uncertainty: f64::NAN,
            core_x: f64::NAN,
            core_y: f64::NAN,
            core_pos_error: f64::NAN,
            hmax: f64::NAN,
            xmax: f64::NAN,
            direction_error: f64::NAN,
            telescopes: Vec::new(),
        }
    }
}

/// Perpendicular distance of a telescope from the reconstructed axis.
#[derive(Clone, Copy, Debug)]
pub struct ImpactParameter {
    /// Distance (meters).
    pub distance: f64,
    /// Distance error (meters).
    pub distance_error: f64,
}

/// Reconstructed primary energy.
#[derive(Clone, Copy, Debug)]
pub struct ReconstructedEnergy {
    pub is_valid: bool,
    /// Energy (TeV).
    pub energy: f64,
    /// Energy uncertainty (TeV).
    pub energy_uncertainty: f64,
}

impl Default for ReconstructedEnergy {
    fn default() -> Self {
        Self {
            is_valid: false,
            energy: f64::NAN,
            energy_uncertainty: f64::NAN,
        }
    }
}

/// Gamma/hadron classification score.
#[derive(Clone, Copy, Debug)]
pub struct ParticleClassification {
    pub is_valid: bool,
    /// Classifier prediction in [0, 1]; 1 is gamma-like.
    pub prediction: f64,
}

impl Default for ParticleClassification {
    fn default() -> Self {
        Self {
            is_valid: false,
            prediction: f64::NAN,
        }
    }
}

/// Per-telescope DL2 data.
#[derive(Clone, Debug, Default)]
pub struct Dl2TelescopeData {
    /// Impact parameters keyed by reconstructor name.
    pub impact_parameters: BTreeMap<String, ImpactParameter>,
}

/// DL2 data level for one event.
#[derive(Clone, Debug, Default)]
pub struct Dl2Event {
    /// Geometry solutions keyed by reconstructor name.
    pub geometry: BTreeMap<String, ReconstructedGeometry>,
    /// Energy estimates keyed by reconstructor name.
    pub energy: BTreeMap<String, ReconstructedEnergy>,
    /// Particle classifications keyed by classifier name.
    pub particle: BTreeMap<String, ParticleClassification>,
    /// Per-telescope data.
    pub tels: BTreeMap<TelId, Dl2TelescopeData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry_is_invalid_nan() {
        let geom = ReconstructedGeometry::default();
        assert!(!geom.is_valid);
        assert!(geom.alt.is_nan());
        assert!(geom.core_x.is_nan());
        assert!(geom.telescopes.is_empty());
    }

    #[test]
    fn test_impact_parameters_keyed_by_name() {
        let mut dl2 = Dl2Event::default();
        dl2.tels.entry(5).or_default().impact_parameters.insert(
            "HillasReconstructor".to_string(),
            ImpactParameter {
                distance: 120.0,
                distance_error: 4.0,
            },
        );
        let impact = &dl2.tels[&5].impact_parameters["HillasReconstructor"];
        assert_eq!(impact.distance, 120.0);
    }
}
