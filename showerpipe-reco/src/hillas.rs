//! Stereoscopic Hillas geometry reconstruction.
//!
//! Each telescope's image ellipse defines a great-circle plane through
//! the shower axis. In the gnomonic nominal frame anchored at the array
//! pointing those circles become straight lines, so the shower
//! direction is the weighted intersection of line pairs, and the core
//! is the weighted intersection of the planes' ground traces.

use log::debug;
use nalgebra::{Matrix2, Vector2, Vector3};
use serde::Deserialize;

use showerpipe_algorithms::moments::hillas_parameters;
use showerpipe_algorithms::ImageQuery;
use showerpipe_core::coords::{Horizontal, NominalFrame};
use showerpipe_core::{
    ArrayEvent, AtmosphereModel, HillasParameters, ImpactParameter, ReconstructedGeometry,
    SubarrayDescription, TelId,
};

use crate::Reconstructor;

/// Offset along the major axis used to trace it onto the sphere.
const AXIS_STEP: f64 = 1e-3;
/// Pairs with `sin^2(angle)` below this are treated as parallel.
const MIN_SIN2_ANGLE: f64 = 1e-9;
/// Condition-number bound for the core solve.
const MAX_CONDITION: f64 = 1e12;

/// Per-reconstructor configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconstructorConfig {
    /// Quality predicate telescopes must pass.
    #[serde(rename = "ImageQuery")]
    pub image_query: String,
    /// Substitute moments of the true photo-electron image, validating
    /// the stereo math against simulation truth.
    pub use_fake_hillas: bool,
}

impl Default for ReconstructorConfig {
    fn default() -> Self {
        Self {
            image_query: "hillas_intensity > 100 && leakage_intensity_width_2 < 0.3 \
                          && hillas_width > 0 && morphology_n_pixels >= 5"
                .to_string(),
            use_fake_hillas: false,
        }
    }
}

/// One telescope's contribution to the stereo fit.
#[derive(Clone, Debug)]
pub struct TelescopeInput {
    pub tel_id: TelId,
    /// Ground position (meters, east/north/up).
    pub position: [f64; 3],
    /// Telescope pointing.
    pub pointing: Horizontal,
    /// Effective focal length (meters).
    pub focal_length: f64,
    /// Image ellipse.
    pub hillas: HillasParameters,
}

/// A telescope's image axis traced into the shared nominal frame.
struct AxisTrace {
    tel_id: TelId,
    position: Vector3<f64>,
    /// Centroid in the nominal plane.
    point: Vector2<f64>,
    /// Unit direction of the axis in the nominal plane.
    direction: Vector2<f64>,
    /// Sky direction of the centroid.
    centroid_sky: Vector3<f64>,
    /// Normal of the great-circle plane in the ground frame.
    plane_normal: Vector3<f64>,
    weight: f64,
}

/// Weighted-intersection stereo reconstructor.
#[derive(Debug)]
pub struct HillasReconstructor {
    name: String,
    query: ImageQuery,
    use_fake_hillas: bool,
}

impl HillasReconstructor {
    /// Parse the quality predicate and build the reconstructor.
    pub fn new(name: impl Into<String>, config: &ReconstructorConfig) -> showerpipe_core::Result<Self> {
        Ok(Self {
            name: name.into(),
            query: ImageQuery::parse(&config.image_query)?,
            use_fake_hillas: config.use_fake_hillas,
        })
    }

    /// Reconstruct direction, core, and shower maximum from telescope
    /// inputs.
    ///
    /// Degeneracies (fewer than two usable telescopes, parallel axes,
    /// singular core system) yield `is_valid = false`, never an error.
    #[must_use]
    pub fn reconstruct(
        &self,
        array_pointing: Horizontal,
        inputs: &[TelescopeInput],
        true_direction: Option<Horizontal>,
        atmosphere: Option<&AtmosphereModel>,
        observation_altitude: f64,
    ) -> (ReconstructedGeometry, Vec<(TelId, ImpactParameter)>) {
        let mut geometry = ReconstructedGeometry::default();
        if inputs.len() < 2 {
            return (geometry, Vec::new());
        }

        let frame = NominalFrame::new(array_pointing);
        let traces: Vec<AxisTrace> = inputs
            .iter()
            .filter_map(|input| trace_axis(&frame, input))
            .collect();
        if traces.len() < 2 {
            return (geometry, Vec::new());
        }

        let Some((direction_nominal, alt_unc, az_unc)) = intersect_pairs(&traces) else {
            return (geometry, Vec::new());
        };
        let direction = frame.nominal_to_sky(direction_nominal.x, direction_nominal.y);

        let Some((core, core_pos_error)) = fit_core(&traces) else {
            return (geometry, Vec::new());
        };

        let axis = direction.unit_vector();
        let hmax = estimate_hmax(&traces, &core, &axis);

        geometry.is_valid = true;
        geometry.alt = direction.alt;
        geometry.az = direction.az;
        geometry.alt_uncertainty = alt_unc;
        geometry.az_uncertainty = az_unc / direction.alt.cos().abs().max(1e-12);
        geometry.core_x = core.x;
        geometry.core_y = core.y;
        geometry.core_pos_error = core_pos_error;
        geometry.hmax = hmax;
        geometry.xmax = atmosphere
            .and_then(|model| {
                let zenith = std::f64::consts::FRAC_PI_2 - direction.alt;
                model
                    .thickness_at(hmax + observation_altitude)
                    .map(|thick| thick / zenith.cos().max(1e-6))
            })
            .unwrap_or(f64::NAN);
        geometry.direction_error = true_direction
            .map(|truth| direction.separation(&truth))
            .unwrap_or(f64::NAN);
        geometry.telescopes = traces.iter().map(|t| t.tel_id).collect();

        let impacts = traces
            .iter()
            .map(|trace| {
                let core3 = Vector3::new(core.x, core.y, 0.0);
                let distance = (trace.position - core3).cross(&axis).norm();
                (
                    trace.tel_id,
                    ImpactParameter {
                        distance,
                        distance_error: core_pos_error,
                    },
                )
            })
            .collect();

        (geometry, impacts)
    }
}

/// Project one telescope's image axis into the nominal frame and trace
/// its great-circle plane.
fn trace_axis(frame: &NominalFrame, input: &TelescopeInput) -> Option<AxisTrace> {
    let hillas = &input.hillas;
    if !(hillas.intensity.is_finite() && hillas.psi.is_finite() && input.focal_length > 0.0) {
        return None;
    }

    // Camera meters -> angles in the telescope's own tangent plane.
    let tel_frame = NominalFrame::new(input.pointing);
    let centroid = (
        hillas.x / input.focal_length,
        hillas.y / input.focal_length,
    );
    let (sin_psi, cos_psi) = hillas.psi.sin_cos();
    let along_axis = (
        centroid.0 + AXIS_STEP * cos_psi,
        centroid.1 + AXIS_STEP * sin_psi,
    );

    let sky0 = tel_frame.nominal_to_sky(centroid.0, centroid.1);
    let sky1 = tel_frame.nominal_to_sky(along_axis.0, along_axis.1);

    let p0 = frame.sky_to_nominal(&sky0)?;
    let p1 = frame.sky_to_nominal(&sky1)?;

    let point = Vector2::new(p0.0, p0.1);
    let delta = Vector2::new(p1.0 - p0.0, p1.1 - p0.1);
    let norm = delta.norm();
    if norm == 0.0 {
        return None;
    }

    let v0 = sky0.unit_vector();
    let v1 = sky1.unit_vector();
    let plane_normal = v0.cross(&v1);

    Some(AxisTrace {
        tel_id: input.tel_id,
        position: Vector3::new(input.position[0], input.position[1], input.position[2]),
        point,
        direction: delta / norm,
        centroid_sky: v0,
        plane_normal,
        weight: hillas.intensity,
    })
}

/// Weighted mean of pairwise axis intersections, with the weighted RMS
/// spread along the two tangent axes.
fn intersect_pairs(traces: &[AxisTrace]) -> Option<(Vector2<f64>, f64, f64)> {
    let mut points: Vec<(Vector2<f64>, f64)> = Vec::new();
    for (i, a) in traces.iter().enumerate() {
        for b in traces.iter().skip(i + 1) {
            let cross = a.direction.x * b.direction.y - a.direction.y * b.direction.x;
            let sin2 = cross * cross;
            if sin2 < MIN_SIN2_ANGLE {
                continue;
            }
            let offset = b.point - a.point;
            let t = (offset.x * b.direction.y - offset.y * b.direction.x) / cross;
            let intersection = a.point + a.direction * t;
            points.push((intersection, a.weight * b.weight * sin2));
        }
    }

    let total: f64 = points.iter().map(|(_, w)| w).sum();
    if points.is_empty() || total <= 0.0 {
        return None;
    }

    let mut mean = Vector2::zeros();
    for (p, w) in &points {
        mean += p * *w;
    }
    mean /= total;

    let mut var = Vector2::zeros();
    for (p, w) in &points {
        let d = p - mean;
        var.x += w * d.x * d.x;
        var.y += w * d.y * d.y;
    }
    var /= total;

    // x tracks azimuth, y altitude.
    Some((mean, var.y.sqrt(), var.x.sqrt()))
}

/// Weighted least-squares intersection of the planes' ground traces.
///
/// Each plane cuts the ground in a line through the telescope position
/// along the horizontal trace of the plane; minimizing the weighted
/// squared perpendicular distances gives a 2x2 linear system.
fn fit_core(traces: &[AxisTrace]) -> Option<(Vector2<f64>, f64)> {
    let mut a = Matrix2::zeros();
    let mut b = Vector2::zeros();
    let mut lines: Vec<(Vector2<f64>, Vector2<f64>, f64)> = Vec::new();

    for trace in traces {
        // Ground trace of the plane: normal x vertical.
        let ground = Vector2::new(trace.plane_normal.y, -trace.plane_normal.x);
        let norm = ground.norm();
        if norm < 1e-15 {
            continue;
        }
        let n = ground / norm;
        let projector = Matrix2::identity() - n * n.transpose();
        let position = Vector2::new(trace.position.x, trace.position.y);
        a += projector * trace.weight;
        b += projector * position * trace.weight;
        lines.push((position, n, trace.weight));
    }
    if lines.len() < 2 {
        return None;
    }

    // Reject near-singular systems by eigenvalue ratio.
    let eigen = a.symmetric_eigen();
    let (max_ev, min_ev) = (
        eigen.eigenvalues.max(),
        eigen.eigenvalues.min(),
    );
    if !(min_ev > 0.0 && max_ev / min_ev < MAX_CONDITION) {
        return None;
    }

    let core = a.try_inverse()? * b;

    let mut weight_sum = 0.0;
    let mut residual = 0.0;
    for (position, n, weight) in &lines {
        let offset = core - position;
        let perpendicular = offset - n * n.dot(&offset);
        residual += weight * perpendicular.norm_squared();
        weight_sum += weight;
    }
    let sigma2 = residual / weight_sum;
    let covariance = (a / weight_sum).try_inverse()? * sigma2;
    let error = covariance.symmetric_eigen().eigenvalues.max().max(0.0).sqrt();

    Some((core, error))
}

/// Intensity-weighted height of shower maximum: closest approach of
/// each telescope's centroid ray to the reconstructed axis.
fn estimate_hmax(traces: &[AxisTrace], core: &Vector2<f64>, axis: &Vector3<f64>) -> f64 {
    let core3 = Vector3::new(core.x, core.y, 0.0);
    let mut height_sum = 0.0;
    let mut weight_sum = 0.0;

    for trace in traces {
        let ray = trace.centroid_sky;
        let cross_dot = axis.dot(&ray);
        let denom = 1.0 - cross_dot * cross_dot;
        if denom < 1e-12 {
            continue;
        }
        let offset = trace.position - core3;
        // Parameter along the shower axis of the closest point to the
        // telescope ray.
        let s = (axis.dot(&offset) - cross_dot * ray.dot(&offset)) / denom;
        let height = s * axis.z;
        if height.is_finite() && height > 0.0 {
            height_sum += trace.weight * height;
            weight_sum += trace.weight;
        }
    }

    if weight_sum > 0.0 {
        height_sum / weight_sum
    } else {
        f64::NAN
    }
}

impl Reconstructor for HillasReconstructor {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(
        &self,
        subarray: &SubarrayDescription,
        atmosphere: Option<&AtmosphereModel>,
        event: &mut ArrayEvent,
    ) {
        let Some(pointing) = event.pointing.as_ref() else {
            debug!("event {}: no pointing, geometry invalid", event.event_id);
            event
                .dl2_mut()
                .geometry
                .insert(self.name.clone(), ReconstructedGeometry::default());
            return;
        };
        let array_pointing = Horizontal::new(pointing.array_altitude, pointing.array_azimuth);

        let mut inputs = Vec::new();
        if let Some(dl1) = &event.dl1 {
            for (&tel_id, camera) in &dl1.tels {
                if !self.query.evaluate(&camera.image_parameters) {
                    continue;
                }
                let Some(telescope) = subarray.tels.get(&tel_id) else {
                    continue;
                };
                let Some(&position) = subarray.tel_positions.get(&tel_id) else {
                    continue;
                };
                let tel_pointing = pointing
                    .tels
                    .get(&tel_id)
                    .map(|t| Horizontal::new(t.altitude, t.azimuth))
                    .unwrap_or(array_pointing);

                let hillas = if self.use_fake_hillas {
                    fake_hillas(event, tel_id, telescope)
                        .unwrap_or(camera.image_parameters.hillas)
                } else {
                    camera.image_parameters.hillas
                };

                inputs.push(TelescopeInput {
                    tel_id,
                    position,
                    pointing: tel_pointing,
                    focal_length: telescope.optics.effective_focal_length,
                    hillas,
                });
            }
        }

        let true_direction = event
            .simulation
            .as_ref()
            .map(|s| Horizontal::new(s.shower.alt, s.shower.az));

        let (geometry, impacts) = self.reconstruct(
            array_pointing,
            &inputs,
            true_direction,
            atmosphere,
            subarray.reference_position[2],
        );

        debug!(
            "event {}: {} with {} telescopes, valid={}",
            event.event_id,
            self.name,
            geometry.telescopes.len(),
            geometry.is_valid
        );

        let dl2 = event.dl2_mut();
        for (tel_id, impact) in impacts {
            dl2.tels
                .entry(tel_id)
                .or_default()
                .impact_parameters
                .insert(self.name.clone(), impact);
        }
        dl2.geometry.insert(self.name.clone(), geometry);
    }
}

/// Moments of the true photo-electron image, for validating the stereo
/// math against simulation truth.
fn fake_hillas(
    event: &ArrayEvent,
    tel_id: TelId,
    telescope: &showerpipe_core::TelescopeDescription,
) -> Option<HillasParameters> {
    let truth = event.simulation.as_ref()?.tels.get(&tel_id)?;
    let geometry = &telescope.camera.geometry;
    if truth.true_image.len() != geometry.num_pixels {
        return None;
    }
    let image: Vec<f64> = truth.true_image.iter().map(|&pe| pe.max(0) as f64).collect();
    let mask: Vec<bool> = image.iter().map(|&v| v > 0.0).collect();
    let hillas = hillas_parameters(geometry, &image, &mask);
    hillas.intensity.is_finite().then_some(hillas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    /// Build a physically consistent telescope input: the image axis is
    /// the projection of the shower axis into the telescope's camera.
    fn telescope_viewing_shower(
        tel_id: TelId,
        position: [f64; 3],
        pointing: Horizontal,
        core: [f64; 2],
        direction: Horizontal,
        intensity: f64,
    ) -> TelescopeInput {
        let focal_length = 16.0;
        let axis = direction.unit_vector();
        let tel = Vector3::new(position[0], position[1], position[2]);
        let tel_frame = NominalFrame::new(pointing);

        let project = |s: f64| -> (f64, f64) {
            let point = Vector3::new(core[0], core[1], 0.0) + axis * s;
            let view = (point - tel).normalize();
            let sky = Horizontal::new(view.z.asin(), view.x.atan2(view.y));
            tel_frame.sky_to_nominal(&sky).expect("in field of view")
        };

        let (x0, y0) = project(9_000.0);
        let (x1, y1) = project(12_000.0);
        let psi = (y1 - y0).atan2(x1 - x0);

        let mut hillas = HillasParameters::default();
        hillas.intensity = intensity;
        hillas.x = x0 * focal_length;
        hillas.y = y0 * focal_length;
        hillas.length = 0.3;
        hillas.width = 0.05;
        hillas.psi = psi;

        TelescopeInput {
            tel_id,
            position,
            pointing,
            focal_length,
            hillas,
        }
    }

    fn reconstructor() -> HillasReconstructor {
        HillasReconstructor::new("HillasReconstructor", &ReconstructorConfig::default()).unwrap()
    }

    #[test]
    fn test_two_telescope_stereo_sanity() {
        let zenith = Horizontal::new(FRAC_PI_2, 0.0);
        let truth = Horizontal::new(FRAC_PI_2 - 0.01, 0.0);
        let core = [0.0, 0.0];

        let inputs = vec![
            telescope_viewing_shower(1, [-50.0, 30.0, 0.0], zenith, core, truth, 1000.0),
            telescope_viewing_shower(2, [50.0, 30.0, 0.0], zenith, core, truth, 1000.0),
        ];

        let (geometry, impacts) =
            reconstructor().reconstruct(zenith, &inputs, Some(truth), None, 0.0);

        assert!(geometry.is_valid);
        assert!(
            Horizontal::new(geometry.alt, geometry.az).separation(&truth) < 1e-3,
            "direction off by {}",
            Horizontal::new(geometry.alt, geometry.az).separation(&truth)
        );
        assert!(geometry.core_x.abs() < 0.5, "core_x = {}", geometry.core_x);
        assert!(geometry.core_y.abs() < 0.5, "core_y = {}", geometry.core_y);
        assert!(geometry.direction_error < 1e-3);
        assert_eq!(geometry.telescopes, vec![1, 2]);

        // Shower maximum was synthesized at s = 9000 along the axis.
        assert!((8_000.0..10_000.0).contains(&geometry.hmax));

        assert_eq!(impacts.len(), 2);
        // Both telescopes sit sqrt(50^2 + 30^2) ~ 58.3 m from the
        // near-vertical axis.
        for (_, impact) in &impacts {
            assert!((impact.distance - 58.3).abs() < 1.0, "impact {}", impact.distance);
        }
    }

    #[test]
    fn test_three_telescope_core_recovery() {
        let zenith = Horizontal::new(FRAC_PI_2, 0.0);
        let truth = Horizontal::new(FRAC_PI_2 - 0.02, 1.0);
        let core = [25.0, -40.0];

        let inputs = vec![
            telescope_viewing_shower(1, [-80.0, 0.0, 0.0], zenith, core, truth, 800.0),
            telescope_viewing_shower(2, [80.0, 30.0, 0.0], zenith, core, truth, 1200.0),
            telescope_viewing_shower(3, [0.0, 90.0, 0.0], zenith, core, truth, 600.0),
        ];

        let (geometry, _) = reconstructor().reconstruct(zenith, &inputs, Some(truth), None, 0.0);

        assert!(geometry.is_valid);
        assert!(geometry.direction_error < 1e-3);
        assert!((geometry.core_x - core[0]).abs() < 0.5);
        assert!((geometry.core_y - core[1]).abs() < 0.5);
        assert!(geometry.alt_uncertainty.is_finite());
        assert!(geometry.az_uncertainty.is_finite());
    }

    #[test]
    fn test_single_telescope_is_invalid() {
        let zenith = Horizontal::new(FRAC_PI_2, 0.0);
        let truth = Horizontal::new(FRAC_PI_2 - 0.01, 0.0);
        let inputs = vec![telescope_viewing_shower(
            1,
            [0.0, 0.0, 0.0],
            zenith,
            [0.0, 0.0],
            truth,
            1000.0,
        )];
        let (geometry, impacts) = reconstructor().reconstruct(zenith, &inputs, None, None, 0.0);
        assert!(!geometry.is_valid);
        assert!(geometry.alt.is_nan());
        assert!(impacts.is_empty());
    }

    #[test]
    fn test_parallel_axes_are_invalid() {
        let zenith = Horizontal::new(FRAC_PI_2, 0.0);
        let mut hillas = HillasParameters::default();
        hillas.intensity = 500.0;
        hillas.x = 0.1;
        hillas.y = 0.0;
        hillas.psi = 0.3;
        hillas.length = 0.2;
        hillas.width = 0.05;

        let mut shifted = hillas;
        shifted.y = 0.05;

        let inputs = vec![
            TelescopeInput {
                tel_id: 1,
                position: [0.0, 0.0, 0.0],
                pointing: zenith,
                focal_length: 16.0,
                hillas,
            },
            TelescopeInput {
                tel_id: 2,
                position: [100.0, 0.0, 0.0],
                pointing: zenith,
                focal_length: 16.0,
                hillas: shifted,
            },
        ];

        let (geometry, _) = reconstructor().reconstruct(zenith, &inputs, None, None, 0.0);
        assert!(!geometry.is_valid);
    }

    #[test]
    fn test_rotation_invariance_about_pointing() {
        let zenith = Horizontal::new(FRAC_PI_2, 0.0);
        let truth = Horizontal::new(FRAC_PI_2 - 0.015, 0.4);
        let core = [0.0, 0.0];
        let positions = [[-60.0, 10.0, 0.0], [70.0, -20.0, 0.0], [10.0, 80.0, 0.0]];

        let build = |rotation: f64| -> Vec<TelescopeInput> {
            let (sin_r, cos_r) = rotation.sin_cos();
            let rotated_truth = Horizontal::new(truth.alt, truth.az + rotation);
            positions
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    // Rotating the ground frame about z by `rotation`
                    // moves azimuths by the same amount.
                    let rotated = [
                        p[0] * cos_r + p[1] * sin_r,
                        -p[0] * sin_r + p[1] * cos_r,
                        0.0,
                    ];
                    telescope_viewing_shower(
                        (i + 1) as TelId,
                        rotated,
                        zenith,
                        core,
                        rotated_truth,
                        1000.0,
                    )
                })
                .collect()
        };

        let (base, _) = reconstructor().reconstruct(zenith, &build(0.0), None, None, 0.0);
        let rotation = 0.7;
        let (rotated, _) = reconstructor().reconstruct(zenith, &build(rotation), None, None, 0.0);

        assert!(base.is_valid && rotated.is_valid);
        assert_relative_eq!(base.alt, rotated.alt, epsilon = 1e-6);
        let mut az_diff = rotated.az - base.az - rotation;
        while az_diff > std::f64::consts::PI {
            az_diff -= 2.0 * std::f64::consts::PI;
        }
        while az_diff < -std::f64::consts::PI {
            az_diff += 2.0 * std::f64::consts::PI;
        }
        assert!(az_diff.abs() < 1e-6, "azimuth shift mismatch: {az_diff}");
        // The core at the origin is a fixed point of the rotation.
        assert!(rotated.core_x.abs() < 0.5);
        assert!(rotated.core_y.abs() < 0.5);
    }

    #[test]
    fn test_xmax_uses_atmosphere() {
        let model = AtmosphereModel {
            alt_km: vec![0.0, 5.0, 10.0, 20.0],
            rho: vec![1.2e-3, 7.0e-4, 4.0e-4, 9.0e-5],
            thick: vec![1030.0, 550.0, 270.0, 55.0],
            refidx_m1: vec![2.8e-4, 1.6e-4, 9.0e-5, 2.0e-5],
        };
        let zenith = Horizontal::new(FRAC_PI_2, 0.0);
        let truth = Horizontal::new(FRAC_PI_2 - 0.01, 0.0);
        let inputs = vec![
            telescope_viewing_shower(1, [-50.0, 30.0, 0.0], zenith, [0.0, 0.0], truth, 1000.0),
            telescope_viewing_shower(2, [50.0, 30.0, 0.0], zenith, [0.0, 0.0], truth, 1000.0),
        ];
        let (geometry, _) =
            reconstructor().reconstruct(zenith, &inputs, None, Some(&model), 0.0);
        assert!(geometry.is_valid);
        assert!(geometry.xmax.is_finite());
        // Near-vertical shower at ~9 km: depth well below ground level.
        assert!(geometry.xmax > 50.0 && geometry.xmax < 1030.0);
    }
}
