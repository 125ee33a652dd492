//! Event-level stereo reconstruction through the shower processor.

use nalgebra::Vector3;
use showerpipe_core::coords::{Horizontal, NominalFrame};
use showerpipe_core::{
    ArrayEvent, CameraDescription, CameraGeometry, CameraReadout, Dl1Camera, OpticsDescription,
    PointingEvent, SimulatedShower, SimulationEvent, SubarrayDescription, TelescopeDescription,
};
use showerpipe_reco::{ShowerProcessor, ShowerProcessorConfig};
use std::f64::consts::FRAC_PI_2;

const FOCAL_LENGTH: f64 = 16.0;

fn subarray(positions: &[[f64; 3]]) -> SubarrayDescription {
    let mut subarray = SubarrayDescription::new("array", [0.0, 0.0, 0.0]);
    for (i, &position) in positions.iter().enumerate() {
        subarray.add_telescope(
            (i + 1) as u32,
            TelescopeDescription {
                tel_name: "TEL".to_string(),
                camera: CameraDescription {
                    geometry: CameraGeometry::rectangular("cam", 4, 4).unwrap(),
                    readout: CameraReadout {
                        camera_name: "cam".to_string(),
                        n_samples: 16,
                        sampling_rate: 1.0,
                        n_channels: 1,
                        n_pixels: 16,
                        reference_pulse_shape: ndarray::Array2::zeros((1, 0)),
                        reference_pulse_sample_width: 1.0,
                    },
                },
                optics: OpticsDescription {
                    optics_name: "optics".to_string(),
                    mirror_area: 100.0,
                    equivalent_focal_length: FOCAL_LENGTH,
                    effective_focal_length: FOCAL_LENGTH,
                    num_mirrors: 1,
                },
            },
            position,
        );
    }
    subarray
}

/// DL1 camera whose parameters describe the projected shower axis and
/// pass the default quality cuts.
fn dl1_viewing_shower(
    position: [f64; 3],
    pointing: Horizontal,
    core: [f64; 2],
    direction: Horizontal,
) -> Dl1Camera {
    let axis = direction.unit_vector();
    let tel = Vector3::new(position[0], position[1], position[2]);
    let frame = NominalFrame::new(pointing);

    let project = |s: f64| -> (f64, f64) {
        let point = Vector3::new(core[0], core[1], 0.0) + axis * s;
        let view = (point - tel).normalize();
        let sky = Horizontal::new(view.z.asin(), view.x.atan2(view.y));
        frame.sky_to_nominal(&sky).expect("in field of view")
    };

    let (x0, y0) = project(9_000.0);
    let (x1, y1) = project(12_000.0);

    let mut camera = Dl1Camera::default();
    let params = &mut camera.image_parameters;
    params.hillas.intensity = 1500.0;
    params.hillas.x = x0 * FOCAL_LENGTH;
    params.hillas.y = y0 * FOCAL_LENGTH;
    params.hillas.psi = (y1 - y0).atan2(x1 - x0);
    params.hillas.length = 0.3;
    params.hillas.width = 0.05;
    params.leakage.intensity_width_2 = 0.0;
    params.morphology.n_pixels = 12;
    camera
}

#[test]
fn stereo_event_end_to_end() {
    let positions = [[-50.0, 30.0, 0.0], [50.0, 30.0, 0.0], [0.0, -60.0, 0.0]];
    let subarray = subarray(&positions);
    let processor = ShowerProcessor::new(&ShowerProcessorConfig::default(), None).unwrap();

    let zenith = Horizontal::new(FRAC_PI_2, 0.0);
    let truth = Horizontal::new(FRAC_PI_2 - 0.01, 0.3);
    let core = [10.0, -5.0];

    let mut event = ArrayEvent::new(7, 1);
    let mut pointing = PointingEvent::default();
    pointing.array_altitude = zenith.alt;
    pointing.array_azimuth = zenith.az;
    event.pointing = Some(pointing);

    for (i, &position) in positions.iter().enumerate() {
        event
            .dl1_mut()
            .tels
            .insert((i + 1) as u32, dl1_viewing_shower(position, zenith, core, truth));
    }

    let mut simulation = SimulationEvent::default();
    simulation.shower = SimulatedShower {
        alt: truth.alt,
        az: truth.az,
        energy: 1.0,
        core_x: core[0],
        core_y: core[1],
        ..Default::default()
    };
    event.simulation = Some(simulation);

    processor.apply(&subarray, &mut event);

    let dl2 = event.dl2.as_ref().expect("dl2 filled");
    let geometry = &dl2.geometry["HillasReconstructor"];
    assert!(geometry.is_valid);
    assert!(geometry.direction_error < 1e-3, "error {}", geometry.direction_error);
    assert!((geometry.core_x - core[0]).abs() < 0.5);
    assert!((geometry.core_y - core[1]).abs() < 0.5);
    assert_eq!(geometry.telescopes.len(), 3);

    // Impact parameters for every contributing telescope.
    for tel_id in [1u32, 2, 3] {
        let impact = &dl2.tels[&tel_id].impact_parameters["HillasReconstructor"];
        assert!(impact.distance.is_finite());
        assert!(impact.distance > 0.0);
    }
}

#[test]
fn telescopes_failing_cuts_are_excluded() {
    let positions = [[-50.0, 30.0, 0.0], [50.0, 30.0, 0.0], [0.0, -60.0, 0.0]];
    let subarray = subarray(&positions);
    let processor = ShowerProcessor::new(&ShowerProcessorConfig::default(), None).unwrap();

    let zenith = Horizontal::new(FRAC_PI_2, 0.0);
    let truth = Horizontal::new(FRAC_PI_2 - 0.01, 0.3);

    let mut event = ArrayEvent::new(8, 1);
    let mut pointing = PointingEvent::default();
    pointing.array_altitude = zenith.alt;
    event.pointing = Some(pointing);

    for (i, &position) in positions.iter().enumerate() {
        let mut camera = dl1_viewing_shower(position, zenith, [0.0, 0.0], truth);
        if i == 2 {
            // Fails the intensity cut.
            camera.image_parameters.hillas.intensity = 10.0;
        }
        event.dl1_mut().tels.insert((i + 1) as u32, camera);
    }

    processor.apply(&subarray, &mut event);

    let geometry = &event.dl2.as_ref().unwrap().geometry["HillasReconstructor"];
    assert!(geometry.is_valid);
    assert_eq!(geometry.telescopes, vec![1, 2]);
}
