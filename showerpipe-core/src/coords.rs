//! Horizontal coordinates and tangent-plane (nominal) frames.
//!
//! The stereo reconstruction works in a gnomonic tangent plane anchored
//! at a pointing direction: small angular offsets become nearly
//! Cartesian there, which linearizes the intersection geometry. The
//! conventions are
//!
//! - altitude `alt` above the horizon, azimuth `az` clockwise from
//!   north, both in radians;
//! - ground frame x = east, y = north, z = up;
//! - nominal-frame `x` grows with azimuth, `y` with altitude.

use nalgebra::Vector3;

/// A direction on the sky in the horizontal system.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Horizontal {
    /// Altitude above the horizon (radians).
    pub alt: f64,
    /// Azimuth, clockwise from north (radians).
    pub az: f64,
}

impl Horizontal {
    /// Construct from altitude and azimuth in radians.
    #[must_use]
    pub fn new(alt: f64, az: f64) -> Self {
        Self { alt, az }
    }

    /// Unit vector in the ground frame (east, north, up).
    #[must_use]
    pub fn unit_vector(&self) -> Vector3<f64> {
        let (sin_alt, cos_alt) = self.alt.sin_cos();
        let (sin_az, cos_az) = self.az.sin_cos();
        Vector3::new(cos_alt * sin_az, cos_alt * cos_az, sin_alt)
    }

    /// Angular separation to another direction, via the Vincenty
    /// formula, which stays accurate for both tiny and antipodal
    /// separations.
    #[must_use]
    pub fn separation(&self, other: &Horizontal) -> f64 {
        let (sin_a1, cos_a1) = self.alt.sin_cos();
        let (sin_a2, cos_a2) = other.alt.sin_cos();
        let delta = other.az - self.az;
        let (sin_d, cos_d) = delta.sin_cos();
        let num = ((cos_a2 * sin_d).powi(2)
            + (cos_a1 * sin_a2 - sin_a1 * cos_a2 * cos_d).powi(2))
        .sqrt();
        let den = sin_a1 * sin_a2 + cos_a1 * cos_a2 * cos_d;
        num.atan2(den)
    }
}

/// Gnomonic tangent plane at a pointing direction.
#[derive(Clone, Copy, Debug)]
pub struct NominalFrame {
    /// Tangent point.
    pub center: Horizontal,
}

impl NominalFrame {
    /// Frame anchored at `center`.
    #[must_use]
    pub fn new(center: Horizontal) -> Self {
        Self { center }
    }

    /// Project a sky direction onto the tangent plane.
    ///
    /// Returns `None` for directions at or beyond 90 degrees from the
    /// tangent point, where the gnomonic projection diverges.
    #[must_use]
    pub fn sky_to_nominal(&self, point: &Horizontal) -> Option<(f64, f64)> {
        let (sin_c, cos_c) = self.center.alt.sin_cos();
        let (sin_a, cos_a) = point.alt.sin_cos();
        let delta = point.az - self.center.az;
        let (sin_d, cos_d) = delta.sin_cos();

        let cos_sep = sin_c * sin_a + cos_c * cos_a * cos_d;
        if cos_sep <= 1e-12 {
            return None;
        }
        let x = cos_a * sin_d / cos_sep;
        let y = (cos_c * sin_a - sin_c * cos_a * cos_d) / cos_sep;
        Some((x, y))
    }

    /// Invert the tangent-plane projection.
    #[must_use]
    pub fn nominal_to_sky(&self, x: f64, y: f64) -> Horizontal {
        let rho = (x * x + y * y).sqrt();
        if rho == 0.0 {
            return self.center;
        }
        let c = rho.atan();
        let (sin_c, cos_c) = c.sin_cos();
        let (sin_alt0, cos_alt0) = self.center.alt.sin_cos();

        let sin_alt = (cos_c * sin_alt0 + y * sin_c * cos_alt0 / rho).clamp(-1.0, 1.0);
        let alt = sin_alt.asin();
        let az = self.center.az
            + (x * sin_c).atan2(rho * cos_alt0 * cos_c - y * sin_alt0 * sin_c);
        Horizontal::new(alt, az)
    }
}
