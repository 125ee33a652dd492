//! Event source reading the HDF5 layout back.
//!
//! Replays R1 waveforms, pointing, monitoring, and simulation truth
//! written by [`crate::hdf5::Hdf5Writer`], so pipeline outputs are valid
//! pipeline inputs. Processed levels (DL1/DL2) are not replayed; they
//! are recomputed downstream.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{File, Group};
use log::debug;
use ndarray::Array2;

use showerpipe_core::{
    ArrayEvent, AtmosphereModel, CameraDescription, CameraGeometry, CameraReadout,
    OpticsDescription, PointingEvent, R1Camera, R1Event, ShowerArray, SimulatedCamera,
    SimulatedShower, SimulationConfig, SimulationEvent, SubarrayDescription, TelId,
    TelescopeDescription, TelescopeMonitor, TelescopePointing,
};

use crate::source::{EventSource, Metaparam};
use crate::{Error, Result};

/// Event source over a showerpipe HDF5 file.
pub struct Hdf5EventSource {
    subarray: SubarrayDescription,
    simulation_config: Option<SimulationConfig>,
    atmosphere_model: Option<AtmosphereModel>,
    metaparam: Metaparam,
    shower_array: ShowerArray,
    events: VecDeque<ArrayEvent>,
}

impl Hdf5EventSource {
    /// Open a file and load its run context and event stream.
    ///
    /// # Errors
    /// Missing file, missing subarray group, or malformed tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.display().to_string()));
        }
        let file = File::open(path)?;

        let subarray = read_subarray(&file)?;
        let simulation_config = read_simulation_config(&file);
        let atmosphere_model = read_atmosphere(&file);
        let metaparam = read_metaparam(&file);

        let mut events: BTreeMap<u64, ArrayEvent> = BTreeMap::new();
        read_r1(&file, &mut events)?;
        read_pointing(&file, &mut events)?;
        read_monitor(&file, &mut events)?;
        read_simulation(&file, &mut events)?;

        let shower_array = read_shower_array(&file, &events);

        debug!(
            "opened {} with {} telescopes, {} events",
            path.display(),
            subarray.num_tels(),
            events.len()
        );

        Ok(Self {
            subarray,
            simulation_config,
            atmosphere_model,
            metaparam,
            shower_array,
            events: events.into_values().collect(),
        })
    }

    /// Restrict the stream to the listed telescope ids.
    pub fn select_telescopes(&mut self, tel_ids: &[TelId]) {
        let keep: std::collections::BTreeSet<TelId> = tel_ids.iter().copied().collect();
        self.subarray.tels.retain(|tel_id, _| keep.contains(tel_id));
        self.subarray
            .tel_positions
            .retain(|tel_id, _| keep.contains(tel_id));
        for event in &mut self.events {
            if let Some(r1) = &mut event.r1 {
                r1.tels.retain(|tel_id, _| keep.contains(tel_id));
            }
            if let Some(simulation) = &mut event.simulation {
                simulation.tels.retain(|tel_id, _| keep.contains(tel_id));
            }
            if let Some(monitor) = &mut event.monitor {
                monitor.tels.retain(|tel_id, _| keep.contains(tel_id));
            }
            if let Some(pointing) = &mut event.pointing {
                pointing.tels.retain(|tel_id, _| keep.contains(tel_id));
            }
        }
    }
}

impl Iterator for Hdf5EventSource {
    type Item = Result<ArrayEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.events.pop_front().map(Ok)
    }
}

impl EventSource for Hdf5EventSource {
    fn subarray(&self) -> &SubarrayDescription {
        &self.subarray
    }

    fn simulation_config(&self) -> Option<&SimulationConfig> {
        self.simulation_config.as_ref()
    }

    fn atmosphere_model(&self) -> Option<&AtmosphereModel> {
        self.atmosphere_model.as_ref()
    }

    fn metaparam(&self) -> &Metaparam {
        &self.metaparam
    }

    fn shower_array(&self) -> &ShowerArray {
        &self.shower_array
    }
}

fn read_vec<T: H5Type>(group: &Group, name: &str) -> Result<Vec<T>> {
    Ok(group.dataset(name)?.read_raw::<T>()?)
}

fn read_vec_opt<T: H5Type>(group: &Group, name: &str) -> Option<Vec<T>> {
    group
        .dataset(name)
        .and_then(|dataset| dataset.read_raw::<T>())
        .ok()
}

fn read_matrix(group: &Group, name: &str) -> Result<Array2<f64>> {
    let dataset = group.dataset(name)?;
    Ok(dataset.read_2d::<f64>()?)
}

fn read_attr<T: H5Type + Clone>(group: &Group, name: &str) -> Option<T> {
    group
        .attr(name)
        .and_then(|attr| attr.read_scalar::<T>())
        .ok()
}

fn read_subarray(file: &File) -> Result<SubarrayDescription> {
    let root = file
        .group("subarray")
        .map_err(|_| Error::InvalidFormat("no subarray group".to_string()))?;

    let name = read_attr::<VarLenUnicode>(&root, "name")
        .map(|v| v.to_string())
        .unwrap_or_default();
    let reference: Vec<f64> = read_vec(&root, "reference_position")?;
    if reference.len() != 3 {
        return Err(Error::InvalidFormat(
            "reference_position must have 3 entries".to_string(),
        ));
    }
    let mut subarray =
        SubarrayDescription::new(name, [reference[0], reference[1], reference[2]]);

    let positions = root.group("tel_positions")?;
    let pos_tel_ids: Vec<u32> = read_vec(&positions, "tel_id")?;
    let pos_x: Vec<f64> = read_vec(&positions, "pos_x")?;
    let pos_y: Vec<f64> = read_vec(&positions, "pos_y")?;
    let pos_z: Vec<f64> = read_vec(&positions, "pos_z")?;

    let optics = root.group("optics")?;
    let optics_names: Vec<VarLenUnicode> = read_vec(&optics, "optics_name")?;
    let mirror_area: Vec<f64> = read_vec(&optics, "mirror_area")?;
    let equivalent: Vec<f64> = read_vec(&optics, "equivalent_focal_length")?;
    let effective: Vec<f64> = read_vec(&optics, "effective_focal_length")?;
    let num_mirrors: Vec<u32> = read_vec(&optics, "num_mirrors")?;

    let geometry = root.group("camera/geometry")?;
    let pix_x = read_matrix(&geometry, "pix_x")?;
    let pix_y = read_matrix(&geometry, "pix_y")?;
    let pix_area = read_matrix(&geometry, "pix_area")?;
    let pix_type = geometry.dataset("pix_type")?.read_2d::<i32>()?;

    let readout = root.group("camera/readout")?;
    let camera_names: Vec<VarLenUnicode> = read_vec(&readout, "camera_name")?;
    let n_samples: Vec<u64> = read_vec(&readout, "n_samples")?;
    let sampling_rate: Vec<f64> = read_vec(&readout, "sampling_rate")?;
    let n_channels: Vec<u64> = read_vec(&readout, "n_channels")?;
    let pulse_width: Vec<f64> = read_vec(&readout, "reference_pulse_sample_width")?;
    // Absent when the run carried no reference pulse shape.
    let pulse_shapes = read_matrix(&readout, "reference_pulse_shape").ok();

    for (row, &tel_id) in pos_tel_ids.iter().enumerate() {
        let pix_x_row: Vec<f64> = pix_x.row(row).to_vec();
        let pix_y_row: Vec<f64> = pix_y.row(row).to_vec();
        let pix_area_row: Vec<f64> = pix_area.row(row).to_vec();
        let pix_type_row: Vec<i32> = pix_type.row(row).to_vec();
        let camera_geometry = CameraGeometry::new(
            camera_names[row].to_string(),
            pix_x_row,
            pix_y_row,
            pix_area_row,
            &pix_type_row,
        )
        .map_err(showerpipe_core::Error::from)?;

        let channels = n_channels[row] as usize;
        let pulse_row: Vec<f64> = pulse_shapes
            .as_ref()
            .map(|m| m.row(row).to_vec())
            .unwrap_or_default();
        let pulse_len = if channels > 0 { pulse_row.len() / channels } else { 0 };
        let reference_pulse_shape =
            Array2::from_shape_vec((channels.max(1), pulse_len), pulse_row)
                .map_err(|e| Error::InvalidFormat(format!("pulse shape: {e}")))?;

        let description = TelescopeDescription {
            tel_name: "TEL".to_string(),
            camera: CameraDescription {
                geometry: camera_geometry,
                readout: CameraReadout {
                    camera_name: camera_names[row].to_string(),
                    n_samples: n_samples[row] as usize,
                    sampling_rate: sampling_rate[row],
                    n_channels: channels,
                    n_pixels: pix_x.ncols(),
                    reference_pulse_shape,
                    reference_pulse_sample_width: pulse_width[row],
                },
            },
            optics: OpticsDescription {
                optics_name: optics_names[row].to_string(),
                mirror_area: mirror_area[row],
                equivalent_focal_length: equivalent[row],
                effective_focal_length: effective[row],
                num_mirrors: num_mirrors[row],
            },
        };
        subarray.add_telescope(tel_id, description, [pos_x[row], pos_y[row], pos_z[row]]);
    }

    Ok(subarray)
}

fn read_r1(file: &File, events: &mut BTreeMap<u64, ArrayEvent>) -> Result<()> {
    let Ok(group) = file.group("events/r1") else {
        return Ok(());
    };
    let event_ids: Vec<u64> = read_vec(&group, "event_id")?;
    let tel_ids: Vec<u32> = read_vec(&group, "tel_id")?;
    let n_pixels: Vec<u64> = read_vec(&group, "n_pixels")?;
    let n_samples: Vec<u64> = read_vec(&group, "n_samples")?;
    let waveforms = read_matrix(&group, "waveform")?;
    let gains = group.dataset("gain_selection")?.read_2d::<i32>()?;

    for row in 0..event_ids.len() {
        let pixels = n_pixels[row] as usize;
        let samples = n_samples[row] as usize;
        if pixels * samples != waveforms.ncols() {
            return Err(Error::InvalidFormat(format!(
                "r1 row {row}: waveform width {} does not match {pixels}x{samples}",
                waveforms.ncols()
            )));
        }
        let waveform =
            Array2::from_shape_vec((pixels, samples), waveforms.row(row).to_vec())
                .map_err(|e| Error::InvalidFormat(format!("r1 waveform: {e}")))?;

        let event = events
            .entry(event_ids[row])
            .or_insert_with(|| ArrayEvent::new(event_ids[row], 0));
        event
            .r1
            .get_or_insert_with(R1Event::default)
            .tels
            .insert(
                tel_ids[row],
                R1Camera {
                    waveform,
                    gain_selection: gains.row(row).to_vec(),
                },
            );
    }
    Ok(())
}

fn read_pointing(file: &File, events: &mut BTreeMap<u64, ArrayEvent>) -> Result<()> {
    let Ok(group) = file.group("events/pointing") else {
        return Ok(());
    };
    let event_ids: Vec<u64> = read_vec(&group, "event_id")?;
    let array_alt: Vec<f64> = read_vec(&group, "array_altitude")?;
    let array_az: Vec<f64> = read_vec(&group, "array_azimuth")?;
    let tel_start: Vec<u64> = read_vec(&group, "tel_start")?;
    let tel_ids: Vec<u32> = read_vec_opt(&group, "tel_id").unwrap_or_default();
    let tel_alt: Vec<f64> = read_vec_opt(&group, "tel_altitude").unwrap_or_default();
    let tel_az: Vec<f64> = read_vec_opt(&group, "tel_azimuth").unwrap_or_default();

    for (row, &event_id) in event_ids.iter().enumerate() {
        let mut pointing = PointingEvent {
            array_altitude: array_alt[row],
            array_azimuth: array_az[row],
            tels: BTreeMap::new(),
        };
        let start = tel_start[row] as usize;
        let end = tel_start
            .get(row + 1)
            .map(|&s| s as usize)
            .unwrap_or(tel_ids.len());
        for i in start..end {
            pointing.tels.insert(
                tel_ids[i],
                TelescopePointing {
                    altitude: tel_alt[i],
                    azimuth: tel_az[i],
                },
            );
        }
        events
            .entry(event_id)
            .or_insert_with(|| ArrayEvent::new(event_id, 0))
            .pointing = Some(pointing);
    }
    Ok(())
}

fn read_monitor(file: &File, events: &mut BTreeMap<u64, ArrayEvent>) -> Result<()> {
    let Ok(group) = file.group("events/monitor") else {
        return Ok(());
    };
    let event_ids: Vec<u64> = read_vec(&group, "event_id")?;
    let tel_ids: Vec<u32> = read_vec(&group, "tel_id")?;
    let n_channels: Vec<u64> = read_vec(&group, "n_channels")?;
    let n_pixels: Vec<u64> = read_vec(&group, "n_pixels")?;
    let dc_to_pe = read_matrix(&group, "dc_to_pe")?;
    let pedestal = read_matrix(&group, "pedestal_per_sample")?;

    for row in 0..event_ids.len() {
        let channels = n_channels[row] as usize;
        let pixels = n_pixels[row] as usize;
        let gains = Array2::from_shape_vec((channels, pixels), dc_to_pe.row(row).to_vec())
            .map_err(|e| Error::InvalidFormat(format!("monitor gains: {e}")))?;
        let pedestals = Array2::from_shape_vec((channels, pixels), pedestal.row(row).to_vec())
            .map_err(|e| Error::InvalidFormat(format!("monitor pedestals: {e}")))?;
        events
            .entry(event_ids[row])
            .or_insert_with(|| ArrayEvent::new(event_ids[row], 0))
            .monitor
            .get_or_insert_with(Default::default)
            .tels
            .insert(
                tel_ids[row],
                TelescopeMonitor {
                    n_channels: channels,
                    n_pixels: pixels,
                    dc_to_pe: gains,
                    pedestal_per_sample: pedestals,
                },
            );
    }
    Ok(())
}

fn read_simulation(file: &File, events: &mut BTreeMap<u64, ArrayEvent>) -> Result<()> {
    if let Ok(group) = file.group("events/simulation/shower") {
        let event_ids: Vec<u64> = read_vec(&group, "event_id")?;
        let energy: Vec<f64> = read_vec(&group, "energy")?;
        let alt: Vec<f64> = read_vec(&group, "alt")?;
        let az: Vec<f64> = read_vec(&group, "az")?;
        let core_x: Vec<f64> = read_vec(&group, "core_x")?;
        let core_y: Vec<f64> = read_vec(&group, "core_y")?;
        let h_first_int: Vec<f64> = read_vec(&group, "h_first_int")?;
        let x_max: Vec<f64> = read_vec(&group, "x_max")?;
        let primary_id: Vec<i32> = read_vec(&group, "primary_id")?;

        for (row, &event_id) in event_ids.iter().enumerate() {
            let shower = SimulatedShower {
                energy: energy[row],
                alt: alt[row],
                az: az[row],
                core_x: core_x[row],
                core_y: core_y[row],
                h_first_int: h_first_int[row],
                x_max: x_max[row],
                primary_id: primary_id[row],
            };
            events
                .entry(event_id)
                .or_insert_with(|| ArrayEvent::new(event_id, 0))
                .simulation
                .get_or_insert_with(SimulationEvent::default)
                .shower = shower;
        }
    }

    if let Ok(group) = file.group("events/simulation/tels") {
        let event_ids: Vec<u64> = read_vec(&group, "event_id")?;
        let tel_ids: Vec<u32> = read_vec(&group, "tel_id")?;
        let impact: Vec<f64> = read_vec(&group, "impact_distance")?;
        let true_images = group
            .dataset("true_image")
            .and_then(|d| d.read_2d::<i32>())
            .ok();

        for row in 0..event_ids.len() {
            let true_image = true_images
                .as_ref()
                .map(|m| m.row(row).to_vec())
                .unwrap_or_default();
            events
                .entry(event_ids[row])
                .or_insert_with(|| ArrayEvent::new(event_ids[row], 0))
                .simulation
                .get_or_insert_with(SimulationEvent::default)
                .tels
                .insert(
                    tel_ids[row],
                    SimulatedCamera {
                        true_image,
                        impact_distance: impact[row],
                    },
                );
        }
    }
    Ok(())
}

fn read_shower_array(file: &File, events: &BTreeMap<u64, ArrayEvent>) -> ShowerArray {
    if let Ok(group) = file.group("events/simulation/all_showers") {
        let energy = read_vec_opt::<f64>(&group, "energy").unwrap_or_default();
        let alt = read_vec_opt::<f64>(&group, "alt").unwrap_or_default();
        let az = read_vec_opt::<f64>(&group, "az").unwrap_or_default();
        let core_x = read_vec_opt::<f64>(&group, "core_x").unwrap_or_default();
        let core_y = read_vec_opt::<f64>(&group, "core_y").unwrap_or_default();
        let x_max = read_vec_opt::<f64>(&group, "x_max").unwrap_or_default();
        if !energy.is_empty() {
            return ShowerArray {
                energy,
                alt,
                az,
                core_x,
                core_y,
                x_max,
            };
        }
    }

    let mut showers = ShowerArray::default();
    for event in events.values() {
        if let Some(simulation) = &event.simulation {
            showers.push(&simulation.shower);
        }
    }
    showers
}

fn read_simulation_config(file: &File) -> Option<SimulationConfig> {
    let group = file.group("cfg/simulation_config").ok()?;
    Some(SimulationConfig {
        run_number: read_attr(&group, "run_number").unwrap_or_default(),
        energy_range_min: read_attr(&group, "energy_range_min").unwrap_or_default(),
        energy_range_max: read_attr(&group, "energy_range_max").unwrap_or_default(),
        spectral_index: read_attr(&group, "spectral_index").unwrap_or_default(),
        n_showers: read_attr(&group, "n_showers").unwrap_or_default(),
        shower_reuse: read_attr(&group, "shower_reuse").unwrap_or_default(),
        max_alt: read_attr(&group, "max_alt").unwrap_or_default(),
        min_alt: read_attr(&group, "min_alt").unwrap_or_default(),
        max_az: read_attr(&group, "max_az").unwrap_or_default(),
        min_az: read_attr(&group, "min_az").unwrap_or_default(),
        diffuse: read_attr(&group, "diffuse").unwrap_or_default(),
        max_viewcone_radius: read_attr(&group, "max_viewcone_radius").unwrap_or_default(),
        min_viewcone_radius: read_attr(&group, "min_viewcone_radius").unwrap_or_default(),
        max_scatter_range: read_attr(&group, "max_scatter_range").unwrap_or_default(),
        min_scatter_range: read_attr(&group, "min_scatter_range").unwrap_or_default(),
        core_pos_mode: read_attr(&group, "core_pos_mode").unwrap_or_default(),
        atmosphere: read_attr(&group, "atmosphere").unwrap_or_default(),
        prod_site_alt: read_attr(&group, "prod_site_alt").unwrap_or_default(),
    })
}

fn read_atmosphere(file: &File) -> Option<AtmosphereModel> {
    let group = file.group("cfg/atmosphere_model").ok()?;
    let model = AtmosphereModel {
        alt_km: read_vec_opt(&group, "alt_km")?,
        rho: read_vec_opt(&group, "rho").unwrap_or_default(),
        thick: read_vec_opt(&group, "thick").unwrap_or_default(),
        refidx_m1: read_vec_opt(&group, "refidx_m1").unwrap_or_default(),
    };
    Some(model)
}

fn read_metaparam(file: &File) -> Metaparam {
    let Ok(group) = file.group("cfg/metaparam") else {
        return Metaparam::default();
    };
    let keys = read_vec_opt::<VarLenUnicode>(&group, "key").unwrap_or_default();
    let values = read_vec_opt::<VarLenUnicode>(&group, "value").unwrap_or_default();
    Metaparam {
        entries: keys
            .iter()
            .zip(&values)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}
