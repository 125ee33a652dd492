//! Weighted image moments: Hillas ellipse and intensity statistics.

use nalgebra::Matrix2;

use showerpipe_core::{CameraGeometry, HillasParameters, IntensityParameters};

use std::f64::consts::{FRAC_PI_2, PI};

/// Minimum surviving pixels for a meaningful parameterization.
pub const MIN_PIXELS: usize = 3;

/// Compute Hillas parameters from a cleaned image.
///
/// `mask` selects the surviving pixels; everything else contributes
/// nothing. Returns the NaN-filled default when fewer than
/// [`MIN_PIXELS`] pixels survive or the total charge is not positive.
#[must_use]
pub fn hillas_parameters(
    camera: &CameraGeometry,
    image: &[f64],
    mask: &[bool],
) -> HillasParameters {
    let survivors: Vec<usize> = (0..camera.num_pixels).filter(|&i| mask[i]).collect();
    let total: f64 = survivors.iter().map(|&i| image[i]).sum();
    if survivors.len() < MIN_PIXELS || total <= 0.0 {
        return HillasParameters::default();
    }

    let mut cog_x = 0.0;
    let mut cog_y = 0.0;
    for &i in &survivors {
        cog_x += image[i] * camera.pix_x[i];
        cog_y += image[i] * camera.pix_y[i];
    }
    cog_x /= total;
    cog_y /= total;

    let mut cov_xx = 0.0;
    let mut cov_yy = 0.0;
    let mut cov_xy = 0.0;
    for &i in &survivors {
        let dx = camera.pix_x[i] - cog_x;
        let dy = camera.pix_y[i] - cog_y;
        cov_xx += image[i] * dx * dx;
        cov_yy += image[i] * dy * dy;
        cov_xy += image[i] * dx * dy;
    }
    cov_xx /= total;
    cov_yy /= total;
    cov_xy /= total;

    let covariance = Matrix2::new(cov_xx, cov_xy, cov_xy, cov_yy);
    let eigen = covariance.symmetric_eigen();
    let (major, minor) = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] {
        (0, 1)
    } else {
        (1, 0)
    };
    // Tiny negative eigenvalues from cancellation clamp to zero.
    let length = eigen.eigenvalues[major].max(0.0).sqrt();
    let width = eigen.eigenvalues[minor].max(0.0).sqrt();

    let axis = eigen.eigenvectors.column(major);
    let psi = fold_psi(axis[1].atan2(axis[0]));

    let (sin_psi, cos_psi) = psi.sin_cos();
    let mut m3 = 0.0;
    let mut m4 = 0.0;
    for &i in &survivors {
        let t = (camera.pix_x[i] - cog_x) * cos_psi + (camera.pix_y[i] - cog_y) * sin_psi;
        m3 += image[i] * t * t * t;
        m4 += image[i] * t * t * t * t;
    }
    m3 /= total;
    m4 /= total;
    let (skewness, kurtosis) = if length > 0.0 {
        (m3 / length.powi(3), m4 / length.powi(4))
    } else {
        (f64::NAN, f64::NAN)
    };

    HillasParameters {
        intensity: total,
        x: cog_x,
        y: cog_y,
        length,
        width,
        psi,
        r: (cog_x * cog_x + cog_y * cog_y).sqrt(),
        phi: cog_y.atan2(cog_x),
        skewness,
        kurtosis,
    }
}

/// Reduce an orientation angle to (-pi/2, pi/2].
fn fold_psi(psi: f64) -> f64 {
    let mut folded = psi;
    while folded > FRAC_PI_2 {
        folded -= PI;
    }
    while folded <= -FRAC_PI_2 {
        folded += PI;
    }
    folded
}

/// Unweighted moments of the surviving pixel charges.
#[must_use]
pub fn intensity_parameters(image: &[f64], mask: &[bool]) -> IntensityParameters {
    let values: Vec<f64> = image
        .iter()
        .zip(mask)
        .filter_map(|(&v, &m)| m.then_some(v))
        .collect();
    if values.len() < MIN_PIXELS {
        return IntensityParameters::default();
    }

    let n = values.len() as f64;
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / n;
    let m2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let m3 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / n;
    let m4 = values.iter().map(|v| (v - mean).powi(4)).sum::<f64>() / n;
    let std = m2.sqrt();
    let (skewness, kurtosis) = if std > 0.0 {
        (m3 / std.powi(3), m4 / std.powi(4))
    } else {
        (f64::NAN, f64::NAN)
    };

    IntensityParameters {
        intensity_max: max,
        intensity_mean: mean,
        intensity_std: std,
        intensity_skewness: skewness,
        intensity_kurtosis: kurtosis,
    }
}
