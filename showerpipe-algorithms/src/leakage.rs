//! Leakage: how much of the image sits on the camera edge.

use showerpipe_core::{CameraGeometry, LeakageParameters};

/// Fraction of surviving pixels and charge on the two border rings.
///
/// Ring 1 is the outermost pixel ring (neighbor-count deficit), ring 2
/// widens it by one dilation; both are precomputed on the camera.
/// Returns the NaN default for an empty mask or non-positive charge.
#[must_use]
pub fn leakage_parameters(
    camera: &CameraGeometry,
    image: &[f64],
    mask: &[bool],
) -> LeakageParameters {
    let n_mask = mask.iter().filter(|&&m| m).count();
    let total: f64 = image
        .iter()
        .zip(mask)
        .filter_map(|(&v, &m)| m.then_some(v))
        .sum();
    if n_mask == 0 || total <= 0.0 {
        return LeakageParameters::default();
    }

    let ring = |border: &[bool]| {
        let mut pixels = 0usize;
        let mut charge = 0.0f64;
        for i in 0..camera.num_pixels {
            if mask[i] && border[i] {
                pixels += 1;
                charge += image[i];
            }
        }
        (pixels as f64 / n_mask as f64, charge / total)
    };

    let (pixels_width_1, intensity_width_1) = ring(camera.border_mask_1());
    let (pixels_width_2, intensity_width_2) = ring(camera.border_mask_2());

    LeakageParameters {
        pixels_width_1,
        pixels_width_2,
        intensity_width_1,
        intensity_width_2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid5() -> CameraGeometry {
        CameraGeometry::rectangular("test", 5, 5).unwrap()
    }

    #[test]
    fn test_empty_mask_is_nan() {
        let camera = grid5();
        let leakage = leakage_parameters(&camera, &vec![0.0; 25], &vec![false; 25]);
        assert!(leakage.pixels_width_1.is_nan());
        assert!(leakage.pixels_width_2.is_nan());
        assert!(leakage.intensity_width_1.is_nan());
        assert!(leakage.intensity_width_2.is_nan());
    }

    #[test]
    fn test_constant_image_fractions() {
        let camera = grid5();
        let image = vec![10.0; 25];
        let mask = vec![true; 25];
        let leakage = leakage_parameters(&camera, &image, &mask);
        assert_relative_eq!(leakage.pixels_width_1, 16.0 / 25.0);
        assert_relative_eq!(leakage.pixels_width_2, 24.0 / 25.0);
        assert_relative_eq!(leakage.intensity_width_1, 160.0 / 250.0);
        assert_relative_eq!(leakage.intensity_width_2, 240.0 / 250.0);
    }

    #[test]
    fn test_bright_corner_pixel() {
        let camera = grid5();
        let mut image = vec![1.0; 25];
        image[0] = 10.0;
        let mask = vec![true; 25];
        let leakage = leakage_parameters(&camera, &image, &mask);
        assert_relative_eq!(leakage.pixels_width_1, 16.0 / 25.0);
        assert_relative_eq!(leakage.pixels_width_2, 24.0 / 25.0);
        assert_relative_eq!(leakage.intensity_width_1, 25.0 / 34.0);
        assert_relative_eq!(leakage.intensity_width_2, 33.0 / 34.0);
    }

    #[test]
    fn test_fractions_stay_in_unit_interval() {
        let camera = grid5();
        let image: Vec<f64> = (0..25).map(|i| (i as f64).sin().abs() + 0.1).collect();
        let mut mask = vec![false; 25];
        for pixel in [0, 1, 2, 12, 13] {
            mask[pixel] = true;
        }
        let leakage = leakage_parameters(&camera, &image, &mask);
        for value in [
            leakage.pixels_width_1,
            leakage.pixels_width_2,
            leakage.intensity_width_1,
            leakage.intensity_width_2,
        ] {
            assert!((0.0..=1.0).contains(&value));
        }
        assert!(leakage.pixels_width_2 >= leakage.pixels_width_1);
    }
}
