//! Charge concentration relative to the Hillas ellipse.

use showerpipe_core::{CameraGeometry, ConcentrationParameters, HillasParameters};

/// Concentration of the cleaned image charge.
///
/// - `concentration_cog`: charge within one `length` of the center of
///   gravity;
/// - `concentration_core`: charge inside the Hillas ellipse;
/// - `concentration_pixel`: charge of the brightest surviving pixel.
///
/// All three are fractions of the total surviving charge. Returns the
/// NaN default when the Hillas parameters are themselves undefined.
#[must_use]
pub fn concentration_parameters(
    camera: &CameraGeometry,
    image: &[f64],
    mask: &[bool],
    hillas: &HillasParameters,
) -> ConcentrationParameters {
    let total = hillas.intensity;
    if !total.is_finite() || total <= 0.0 {
        return ConcentrationParameters::default();
    }

    let (sin_psi, cos_psi) = hillas.psi.sin_cos();
    let mut cog = 0.0;
    let mut core = 0.0;
    let mut brightest = f64::NEG_INFINITY;

    for i in 0..camera.num_pixels {
        if !mask[i] {
            continue;
        }
        let dx = camera.pix_x[i] - hillas.x;
        let dy = camera.pix_y[i] - hillas.y;

        if (dx * dx + dy * dy).sqrt() <= hillas.length {
            cog += image[i];
        }

        if hillas.length > 0.0 && hillas.width > 0.0 {
            let longitudinal = dx * cos_psi + dy * sin_psi;
            let transverse = -dx * sin_psi + dy * cos_psi;
            let ellipse = (longitudinal / hillas.length).powi(2)
                + (transverse / hillas.width).powi(2);
            if ellipse <= 1.0 {
                core += image[i];
            }
        }

        brightest = brightest.max(image[i]);
    }

    let concentration_core = if hillas.length > 0.0 && hillas.width > 0.0 {
        core / total
    } else {
        f64::NAN
    };

    ConcentrationParameters {
        concentration_cog: cog / total,
        concentration_core,
        concentration_pixel: brightest / total,
    }
}
