//! End-to-end checks of cleaning plus parameterization invariants.

use showerpipe_algorithms::{parameterize, tailcuts_clean, TailcutsCleaner, TailcutsConfig};
use showerpipe_algorithms::cleaning::ImageCleaner;
use showerpipe_core::CameraGeometry;

fn grid(n: usize) -> CameraGeometry {
    CameraGeometry::rectangular("test", n, n).unwrap()
}

/// An elongated track with a soft halo, cleaned and parameterized.
#[test]
fn track_image_parameters_are_consistent() {
    let camera = grid(9);
    let mut image = vec![0.0; 81];
    // Bright track along y = 4.
    for x in 2..7 {
        image[4 * 9 + x] = 30.0;
    }
    // Halo one row above and below.
    for x in 2..7 {
        image[3 * 9 + x] = 6.0;
        image[5 * 9 + x] = 6.0;
    }

    let cleaner = TailcutsCleaner::new(
        TailcutsConfig::default()
            .with_picture_thresh(15.0)
            .with_boundary_thresh(5.0)
            .with_min_number_picture_neighbors(1),
    )
    .unwrap();
    let mask = cleaner.clean(&camera, &image);
    let params = parameterize(&camera, &image, &mask);

    // All 15 track+halo pixels survive: halo touches the track.
    assert_eq!(params.morphology.n_pixels, 15);
    assert_eq!(params.morphology.n_islands, 1);

    // Hillas invariants.
    let expected_total: f64 = image
        .iter()
        .zip(&mask)
        .filter_map(|(&v, &m)| m.then_some(v))
        .sum();
    assert!((params.hillas.intensity - expected_total).abs() < 1e-9);
    assert!(params.hillas.length >= params.hillas.width);
    assert!(params.hillas.width >= 0.0);
    // The track is horizontal.
    assert!(params.hillas.psi.abs() < 1e-9);
    assert!((params.hillas.x - 4.0).abs() < 1e-9);
    assert!((params.hillas.y - 4.0).abs() < 1e-9);

    // Leakage: the track stays away from the edge rings except at its
    // endpoints in ring 2.
    assert!(params.leakage.pixels_width_1 >= 0.0);
    assert!(params.leakage.pixels_width_2 <= 1.0);
    assert!(params.leakage.pixels_width_2 >= params.leakage.pixels_width_1);

    // Concentration fractions are ordered sensibly.
    assert!(params.concentration.concentration_pixel <= 1.0);
    assert!(params.concentration.concentration_pixel > 0.0);

    // Intensity stats.
    assert!((params.intensity.intensity_max - 30.0).abs() < 1e-9);
    assert!(params.intensity.intensity_mean > 0.0);
}

/// Morphology island accounting holds for scattered masks.
#[test]
fn island_counts_add_up() {
    let camera = grid(9);
    let mut image = vec![0.0; 81];
    // Three separated blobs.
    for pixel in [0, 1, 9] {
        image[pixel] = 20.0;
    }
    for pixel in [40, 41, 49, 50] {
        image[pixel] = 20.0;
    }
    image[80] = 20.0;

    let mask = tailcuts_clean(&camera, &image, 10.0, 5.0, true, 0);
    let params = parameterize(&camera, &image, &mask);

    assert_eq!(params.morphology.n_islands, 3);
    assert_eq!(
        params.morphology.n_islands,
        params.morphology.n_small_islands
            + params.morphology.n_medium_islands
            + params.morphology.n_large_islands
    );
    assert_eq!(params.morphology.n_pixels, 8);
}

/// Cleaning survivors are justified by thresholds and adjacency.
#[test]
fn cleaning_justification_holds_for_random_like_images() {
    let camera = grid(7);
    let image: Vec<f64> = (0..49)
        .map(|i| ((i * 37 + 11) % 23) as f64)
        .collect();
    let (picture, boundary) = (15.0, 7.0);
    let mask = tailcuts_clean(&camera, &image, picture, boundary, false, 2);

    for (i, &survived) in mask.iter().enumerate() {
        if !survived {
            continue;
        }
        assert!(image[i] >= boundary, "pixel {i} below boundary");
        let neighbors = camera.neigh_matrix.neighbors(i);
        let picture_neighbors = neighbors.iter().filter(|&&j| image[j] >= picture).count();
        if image[i] >= picture {
            // Either qualified picture pixel or rescued as boundary.
            assert!(picture_neighbors >= 1 || neighbors.iter().any(|&j| image[j] >= boundary));
        } else {
            assert!(picture_neighbors >= 1, "boundary pixel {i} with no picture neighbor");
        }
    }
}
