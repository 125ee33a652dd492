//! HDF5 writer backend.
//!
//! Layout (groups/datasets):
//!
//! ```text
//! /cfg/{atmosphere_model, simulation_config, metaparam}
//! /subarray/{reference_position, tel_positions, optics, camera/{geometry, readout}}
//! /events/simulation/{shower, tels, all_showers}
//! /events/{r0, r1, dl0, dl1, monitor, pointing}
//! /events/dl2/{geometry/<name>, impact}
//! ```
//!
//! Per-telescope tables are extendable column datasets with one row per
//! telescope; each carries an `index` subgroup mapping events to row
//! ranges, and `close()` adds a `(event_id, tel_id)`-sorted secondary
//! index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{File, Group};
use ndarray::{s, ArrayView1, ArrayView2};

use showerpipe_core::{
    ArrayEvent, AtmosphereModel, ShowerArray, SimulationConfig, SubarrayDescription,
};

use crate::source::Metaparam;
use crate::writer::RecordWriter;
use crate::{Error, Result};

const SCALAR_CHUNK: usize = 1024;
const ROW_CHUNK: usize = 16;
const FORMAT_VERSION: &str = "1.0";

/// HDF5 implementation of [`RecordWriter`].
pub struct Hdf5Writer {
    path: PathBuf,
    file: Option<File>,
    /// (event_id, tel_id) per row, per indexed table; consumed at
    /// close to build the secondary index.
    row_keys: HashMap<String, Vec<(u64, u32)>>,
}

impl Hdf5Writer {
    /// Create a writer for `path`; nothing happens until `open`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
            row_keys: HashMap::new(),
        }
    }

    fn file(&self) -> Result<&File> {
        self.file
            .as_ref()
            .ok_or_else(|| Error::InvalidFormat("writer is not open".to_string()))
    }

    /// Get or create a nested group.
    fn ensure_group(&self, path: &str) -> Result<Group> {
        let file = self.file()?;
        let mut current: Group = (**file).clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = match current.group(segment) {
                Ok(group) => group,
                Err(_) => current.create_group(segment)?,
            };
        }
        Ok(current)
    }

    /// Record one per-telescope row for the secondary index.
    fn note_row(&mut self, table: &str, event_id: u64, tel_id: u32) {
        self.row_keys
            .entry(table.to_string())
            .or_default()
            .push((event_id, tel_id));
    }

    /// Append the per-event index entry (event id and first row) for a
    /// per-telescope table.
    fn append_event_index(&mut self, table: &str, event_id: u64, start_row: usize) -> Result<()> {
        let index = self.ensure_group(&format!("{table}/index"))?;
        append_values(&index, "event_id", &[event_id])?;
        append_values(&index, "tel_start", &[start_row as u64])?;
        Ok(())
    }

    fn finalize_indexes(&mut self) -> Result<()> {
        let tables: Vec<(String, Vec<(u64, u32)>)> = self.row_keys.drain().collect();
        for (table, keys) in tables {
            let mut order: Vec<usize> = (0..keys.len()).collect();
            order.sort_unstable_by_key(|&i| keys[i]);
            let event_ids: Vec<u64> = order.iter().map(|&i| keys[i].0).collect();
            let tel_ids: Vec<u32> = order.iter().map(|&i| keys[i].1).collect();
            let rows: Vec<u64> = order.iter().map(|&i| i as u64).collect();

            let index = self.ensure_group(&format!("{table}/index"))?;
            append_values(&index, "entry_event_id", &event_ids)?;
            append_values(&index, "entry_tel_id", &tel_ids)?;
            append_values(&index, "entry_row", &rows)?;
        }
        Ok(())
    }
}

impl RecordWriter for Hdf5Writer {
    fn open(&mut self, overwrite: bool) -> Result<()> {
        if self.path.exists() && !overwrite {
            return Err(Error::AlreadyExists(self.path.display().to_string()));
        }
        let file = File::create(&self.path)?;
        set_attr_str(&file, "showerpipe_format_version", FORMAT_VERSION)?;
        self.file = Some(file);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.finalize_indexes()?;
        // Dropping the handle flushes.
        self.file = None;
        Ok(())
    }

    fn write_subarray(&mut self, subarray: &SubarrayDescription) -> Result<()> {
        let root = self.ensure_group("subarray")?;
        set_attr_str(&root, "name", &subarray.name)?;

        let reference = root
            .new_dataset::<f64>()
            .shape((3,))
            .create("reference_position")?;
        reference.write(ArrayView1::from(&subarray.reference_position[..]))?;

        let positions = self.ensure_group("subarray/tel_positions")?;
        let optics = self.ensure_group("subarray/optics")?;
        let geometry = self.ensure_group("subarray/camera/geometry")?;
        let readout = self.ensure_group("subarray/camera/readout")?;

        for (&tel_id, telescope) in &subarray.tels {
            let position = subarray.tel_positions.get(&tel_id).copied().unwrap_or([f64::NAN; 3]);
            append_values(&positions, "tel_id", &[tel_id])?;
            append_values(&positions, "pos_x", &[position[0]])?;
            append_values(&positions, "pos_y", &[position[1]])?;
            append_values(&positions, "pos_z", &[position[2]])?;

            let optic = &telescope.optics;
            append_values(&optics, "tel_id", &[tel_id])?;
            append_string(&optics, "optics_name", &optic.optics_name)?;
            append_values(&optics, "mirror_area", &[optic.mirror_area])?;
            append_values(&optics, "equivalent_focal_length", &[optic.equivalent_focal_length])?;
            append_values(&optics, "effective_focal_length", &[optic.effective_focal_length])?;
            append_values(&optics, "num_mirrors", &[optic.num_mirrors])?;

            let camera = &telescope.camera.geometry;
            append_values(&geometry, "tel_id", &[tel_id])?;
            append_values(&geometry, "n_pixels", &[camera.num_pixels as u64])?;
            append_row(&geometry, "pix_x", &camera.pix_x)?;
            append_row(&geometry, "pix_y", &camera.pix_y)?;
            append_row(&geometry, "pix_area", &camera.pix_area)?;
            let codes: Vec<i32> = camera.pix_type.iter().map(|shape| shape.code()).collect();
            append_row(&geometry, "pix_type", &codes)?;

            let r = &telescope.camera.readout;
            append_values(&readout, "tel_id", &[tel_id])?;
            append_string(&readout, "camera_name", &r.camera_name)?;
            append_values(&readout, "n_samples", &[r.n_samples as u64])?;
            append_values(&readout, "sampling_rate", &[r.sampling_rate])?;
            append_values(&readout, "n_channels", &[r.n_channels as u64])?;
            append_values(&readout, "n_pixels", &[r.n_pixels as u64])?;
            append_values(&readout, "reference_pulse_sample_width", &[r.reference_pulse_sample_width])?;
            let pulse: Vec<f64> = r.reference_pulse_shape.iter().copied().collect();
            append_row(&readout, "reference_pulse_shape", &pulse)?;
        }
        Ok(())
    }

    fn write_simulation_config(&mut self, config: &SimulationConfig) -> Result<()> {
        let group = self.ensure_group("cfg/simulation_config")?;
        set_attr(&group, "run_number", config.run_number)?;
        set_attr(&group, "energy_range_min", config.energy_range_min)?;
        set_attr(&group, "energy_range_max", config.energy_range_max)?;
        set_attr(&group, "spectral_index", config.spectral_index)?;
        set_attr(&group, "n_showers", config.n_showers)?;
        set_attr(&group, "shower_reuse", config.shower_reuse)?;
        set_attr(&group, "max_alt", config.max_alt)?;
        set_attr(&group, "min_alt", config.min_alt)?;
        set_attr(&group, "max_az", config.max_az)?;
        set_attr(&group, "min_az", config.min_az)?;
        set_attr(&group, "diffuse", config.diffuse)?;
        set_attr(&group, "max_viewcone_radius", config.max_viewcone_radius)?;
        set_attr(&group, "min_viewcone_radius", config.min_viewcone_radius)?;
        set_attr(&group, "max_scatter_range", config.max_scatter_range)?;
        set_attr(&group, "min_scatter_range", config.min_scatter_range)?;
        set_attr(&group, "core_pos_mode", config.core_pos_mode)?;
        set_attr(&group, "atmosphere", config.atmosphere)?;
        set_attr(&group, "prod_site_alt", config.prod_site_alt)?;
        Ok(())
    }

    fn write_atmosphere_model(&mut self, model: &AtmosphereModel) -> Result<()> {
        let group = self.ensure_group("cfg/atmosphere_model")?;
        append_values(&group, "alt_km", &model.alt_km)?;
        append_values(&group, "rho", &model.rho)?;
        append_values(&group, "thick", &model.thick)?;
        append_values(&group, "refidx_m1", &model.refidx_m1)?;
        Ok(())
    }

    fn write_metaparam(&mut self, metaparam: &Metaparam) -> Result<()> {
        let group = self.ensure_group("cfg/metaparam")?;
        for (key, value) in &metaparam.entries {
            append_string(&group, "key", key)?;
            append_string(&group, "value", value)?;
        }
        Ok(())
    }

    fn write_shower_array(&mut self, showers: &ShowerArray) -> Result<()> {
        let group = self.ensure_group("events/simulation/all_showers")?;
        append_values(&group, "energy", &showers.energy)?;
        append_values(&group, "alt", &showers.alt)?;
        append_values(&group, "az", &showers.az)?;
        append_values(&group, "core_x", &showers.core_x)?;
        append_values(&group, "core_y", &showers.core_y)?;
        append_values(&group, "x_max", &showers.x_max)?;
        Ok(())
    }

    fn write_simulation_shower(&mut self, event: &ArrayEvent) -> Result<()> {
        let Some(simulation) = &event.simulation else {
            return Ok(());
        };
        let group = self.ensure_group("events/simulation/shower")?;
        let shower = &simulation.shower;
        append_values(&group, "event_id", &[event.event_id])?;
        append_values(&group, "energy", &[shower.energy])?;
        append_values(&group, "alt", &[shower.alt])?;
        append_values(&group, "az", &[shower.az])?;
        append_values(&group, "core_x", &[shower.core_x])?;
        append_values(&group, "core_y", &[shower.core_y])?;
        append_values(&group, "h_first_int", &[shower.h_first_int])?;
        append_values(&group, "x_max", &[shower.x_max])?;
        append_values(&group, "primary_id", &[shower.primary_id])?;
        Ok(())
    }

    fn write_simulated_camera(&mut self, event: &ArrayEvent, with_image: bool) -> Result<()> {
        let Some(simulation) = &event.simulation else {
            return Ok(());
        };
        if simulation.tels.is_empty() {
            return Ok(());
        }
        let table = "events/simulation/tels";
        let group = self.ensure_group(table)?;
        let start = dataset_len(&group, "event_id")?;
        for (&tel_id, truth) in &simulation.tels {
            append_values(&group, "event_id", &[event.event_id])?;
            append_values(&group, "tel_id", &[tel_id])?;
            append_values(&group, "impact_distance", &[truth.impact_distance])?;
            if with_image {
                append_row(&group, "true_image", &truth.true_image)?;
            }
            self.note_row(table, event.event_id, tel_id);
        }
        self.append_event_index(table, event.event_id, start)
    }

    fn write_r0(&mut self, event: &ArrayEvent) -> Result<()> {
        let Some(r0) = &event.r0 else {
            return Ok(());
        };
        let table = "events/r0";
        let group = self.ensure_group(table)?;
        let start = dataset_len(&group, "event_id")?;
        for (&tel_id, camera) in &r0.tels {
            append_values(&group, "event_id", &[event.event_id])?;
            append_values(&group, "tel_id", &[tel_id])?;
            append_values(&group, "n_pixels", &[camera.waveform[0].nrows() as u64])?;
            append_values(&group, "n_samples", &[camera.waveform[0].ncols() as u64])?;
            let low: Vec<u16> = camera.waveform[0].iter().copied().collect();
            let high: Vec<u16> = camera.waveform[1].iter().copied().collect();
            append_row(&group, "low_gain_waveform", &low)?;
            append_row(&group, "high_gain_waveform", &high)?;
            self.note_row(table, event.event_id, tel_id);
        }
        self.append_event_index(table, event.event_id, start)
    }

    fn write_r1(&mut self, event: &ArrayEvent) -> Result<()> {
        let Some(r1) = &event.r1 else {
            return Ok(());
        };
        let table = "events/r1";
        let group = self.ensure_group(table)?;
        let start = dataset_len(&group, "event_id")?;
        for (&tel_id, camera) in &r1.tels {
            append_values(&group, "event_id", &[event.event_id])?;
            append_values(&group, "tel_id", &[tel_id])?;
            append_values(&group, "n_pixels", &[camera.waveform.nrows() as u64])?;
            append_values(&group, "n_samples", &[camera.waveform.ncols() as u64])?;
            let waveform: Vec<f64> = camera.waveform.iter().copied().collect();
            append_row(&group, "waveform", &waveform)?;
            append_row(&group, "gain_selection", &camera.gain_selection)?;
            self.note_row(table, event.event_id, tel_id);
        }
        self.append_event_index(table, event.event_id, start)
    }

    fn write_dl0(&mut self, event: &ArrayEvent) -> Result<()> {
        let Some(dl0) = &event.dl0 else {
            return Ok(());
        };
        let table = "events/dl0";
        let group = self.ensure_group(table)?;
        let start = dataset_len(&group, "event_id")?;
        for (&tel_id, camera) in &dl0.tels {
            append_values(&group, "event_id", &[event.event_id])?;
            append_values(&group, "tel_id", &[tel_id])?;
            append_row(&group, "image", &camera.image)?;
            append_row(&group, "peak_time", &camera.peak_time)?;
            self.note_row(table, event.event_id, tel_id);
        }
        self.append_event_index(table, event.event_id, start)
    }

    fn write_dl1(&mut self, event: &ArrayEvent, with_image: bool) -> Result<()> {
        let Some(dl1) = &event.dl1 else {
            return Ok(());
        };
        let table = "events/dl1";
        let group = self.ensure_group(table)?;
        let start = dataset_len(&group, "event_id")?;
        for (&tel_id, camera) in &dl1.tels {
            append_values(&group, "event_id", &[event.event_id])?;
            append_values(&group, "tel_id", &[tel_id])?;

            let p = &camera.image_parameters;
            append_values(&group, "hillas_intensity", &[p.hillas.intensity])?;
            append_values(&group, "hillas_x", &[p.hillas.x])?;
            append_values(&group, "hillas_y", &[p.hillas.y])?;
            append_values(&group, "hillas_length", &[p.hillas.length])?;
            append_values(&group, "hillas_width", &[p.hillas.width])?;
            append_values(&group, "hillas_psi", &[p.hillas.psi])?;
            append_values(&group, "hillas_r", &[p.hillas.r])?;
            append_values(&group, "hillas_phi", &[p.hillas.phi])?;
            append_values(&group, "hillas_skewness", &[p.hillas.skewness])?;
            append_values(&group, "hillas_kurtosis", &[p.hillas.kurtosis])?;
            append_values(&group, "leakage_pixels_width_1", &[p.leakage.pixels_width_1])?;
            append_values(&group, "leakage_pixels_width_2", &[p.leakage.pixels_width_2])?;
            append_values(&group, "leakage_intensity_width_1", &[p.leakage.intensity_width_1])?;
            append_values(&group, "leakage_intensity_width_2", &[p.leakage.intensity_width_2])?;
            append_values(&group, "concentration_cog", &[p.concentration.concentration_cog])?;
            append_values(&group, "concentration_core", &[p.concentration.concentration_core])?;
            append_values(&group, "concentration_pixel", &[p.concentration.concentration_pixel])?;
            append_values(&group, "morphology_n_pixels", &[p.morphology.n_pixels])?;
            append_values(&group, "morphology_n_islands", &[p.morphology.n_islands])?;
            append_values(&group, "morphology_n_small_islands", &[p.morphology.n_small_islands])?;
            append_values(&group, "morphology_n_medium_islands", &[p.morphology.n_medium_islands])?;
            append_values(&group, "morphology_n_large_islands", &[p.morphology.n_large_islands])?;
            append_values(&group, "intensity_max", &[p.intensity.intensity_max])?;
            append_values(&group, "intensity_mean", &[p.intensity.intensity_mean])?;
            append_values(&group, "intensity_std", &[p.intensity.intensity_std])?;
            append_values(&group, "intensity_skewness", &[p.intensity.intensity_skewness])?;
            append_values(&group, "intensity_kurtosis", &[p.intensity.intensity_kurtosis])?;

            if with_image {
                append_row(&group, "image", &camera.image)?;
                append_row(&group, "peak_time", &camera.peak_time)?;
                let mask: Vec<u8> = camera.mask.iter().map(|&b| u8::from(b)).collect();
                append_row(&group, "mask", &mask)?;
            }
            self.note_row(table, event.event_id, tel_id);
        }
        self.append_event_index(table, event.event_id, start)
    }

    fn write_dl2(&mut self, event: &ArrayEvent) -> Result<()> {
        let Some(dl2) = &event.dl2 else {
            return Ok(());
        };

        for (name, geometry) in &dl2.geometry {
            let group = self.ensure_group(&format!("events/dl2/geometry/{name}"))?;
            append_values(&group, "event_id", &[event.event_id])?;
            append_values(&group, "is_valid", &[u8::from(geometry.is_valid)])?;
            append_values(&group, "alt", &[geometry.alt])?;
            append_values(&group, "az", &[geometry.az])?;
            append_values(&group, "alt_uncertainty", &[geometry.alt_uncertainty])?;
            append_values(&group, "az_uncertainty", &[geometry.az_uncertainty])?;
            append_values(&group, "core_x", &[geometry.core_x])?;
            append_values(&group, "core_y", &[geometry.core_y])?;
            append_values(&group, "core_pos_error", &[geometry.core_pos_error])?;
            append_values(&group, "hmax", &[geometry.hmax])?;
            append_values(&group, "xmax", &[geometry.xmax])?;
            append_values(&group, "direction_error", &[geometry.direction_error])?;
            append_values(&group, "n_telescopes", &[geometry.telescopes.len() as u64])?;
            let tel_start = dataset_len(&group, "telescopes")?;
            append_values(&group, "telescopes", &geometry.telescopes)?;
            append_values(&group, "telescopes_start", &[tel_start as u64])?;
        }

        if !dl2.tels.is_empty() {
            let table = "events/dl2/impact";
            let group = self.ensure_group(table)?;
            let start = dataset_len(&group, "event_id")?;
            for (&tel_id, tel_data) in &dl2.tels {
                for (name, impact) in &tel_data.impact_parameters {
                    append_values(&group, "event_id", &[event.event_id])?;
                    append_values(&group, "tel_id", &[tel_id])?;
                    append_string(&group, "reconstructor", name)?;
                    append_values(&group, "distance", &[impact.distance])?;
                    append_values(&group, "distance_error", &[impact.distance_error])?;
                }
                self.note_row(table, event.event_id, tel_id);
            }
            self.append_event_index(table, event.event_id, start)?;
        }
        Ok(())
    }

    fn write_monitor(&mut self, event: &ArrayEvent) -> Result<()> {
        let Some(monitor) = &event.monitor else {
            return Ok(());
        };
        let table = "events/monitor";
        let group = self.ensure_group(table)?;
        let start = dataset_len(&group, "event_id")?;
        for (&tel_id, tel_monitor) in &monitor.tels {
            append_values(&group, "event_id", &[event.event_id])?;
            append_values(&group, "tel_id", &[tel_id])?;
            append_values(&group, "n_channels", &[tel_monitor.n_channels as u64])?;
            append_values(&group, "n_pixels", &[tel_monitor.n_pixels as u64])?;
            let dc_to_pe: Vec<f64> = tel_monitor.dc_to_pe.iter().copied().collect();
            let pedestal: Vec<f64> = tel_monitor.pedestal_per_sample.iter().copied().collect();
            append_row(&group, "dc_to_pe", &dc_to_pe)?;
            append_row(&group, "pedestal_per_sample", &pedestal)?;
            self.note_row(table, event.event_id, tel_id);
        }
        self.append_event_index(table, event.event_id, start)
    }

    fn write_pointing(&mut self, event: &ArrayEvent) -> Result<()> {
        let Some(pointing) = &event.pointing else {
            return Ok(());
        };
        let group = self.ensure_group("events/pointing")?;
        append_values(&group, "event_id", &[event.event_id])?;
        append_values(&group, "array_altitude", &[pointing.array_altitude])?;
        append_values(&group, "array_azimuth", &[pointing.array_azimuth])?;
        let tel_start = dataset_len(&group, "tel_id")?;
        append_values(&group, "tel_start", &[tel_start as u64])?;
        for (&tel_id, tel) in &pointing.tels {
            append_values(&group, "tel_id", &[tel_id])?;
            append_values(&group, "tel_altitude", &[tel.altitude])?;
            append_values(&group, "tel_azimuth", &[tel.azimuth])?;
        }
        Ok(())
    }
}

/// Length of an extendable dataset, zero if it does not exist yet.
pub(crate) fn dataset_len(group: &Group, name: &str) -> Result<usize> {
    match group.dataset(name) {
        Ok(dataset) => Ok(dataset.shape().first().copied().unwrap_or(0)),
        Err(_) => Ok(0),
    }
}

/// Append scalars to a 1-D extendable dataset, creating it on first
/// use.
pub(crate) fn append_values<T: H5Type>(group: &Group, name: &str, values: &[T]) -> Result<()> {
    if values.is_empty() {
        return Ok(());
    }
    let dataset = match group.dataset(name) {
        Ok(dataset) => dataset,
        Err(_) => group
            .new_dataset::<T>()
            .shape((0..,))
            .chunk((SCALAR_CHUNK,))
            .create(name)?,
    };
    let offset = dataset.shape()[0];
    let end = offset + values.len();
    dataset.resize((end,))?;
    dataset.write_slice(ArrayView1::from(values), s![offset..end])?;
    Ok(())
}

/// Append one fixed-width row to a 2-D extendable dataset; the width is
/// captured from the first row.
pub(crate) fn append_row<T: H5Type>(group: &Group, name: &str, row: &[T]) -> Result<()> {
    if row.is_empty() {
        return Ok(());
    }
    let dataset = match group.dataset(name) {
        Ok(dataset) => dataset,
        Err(_) => group
            .new_dataset::<T>()
            .shape((0.., row.len()))
            .chunk((ROW_CHUNK, row.len()))
            .deflate(1)
            .create(name)?,
    };
    let shape = dataset.shape();
    if shape[1] != row.len() {
        return Err(Error::InvalidFormat(format!(
            "dataset {name} has width {}, row has {} entries",
            shape[1],
            row.len()
        )));
    }
    let offset = shape[0];
    dataset.resize((offset + 1, row.len()))?;
    let view = ArrayView2::from_shape((1, row.len()), row)
        .map_err(|e| Error::InvalidFormat(format!("row shape: {e}")))?;
    dataset.write_slice(view, s![offset..offset + 1, ..])?;
    Ok(())
}

/// Append one string to a variable-length unicode dataset.
pub(crate) fn append_string(group: &Group, name: &str, value: &str) -> Result<()> {
    let encoded = to_unicode(value)?;
    let dataset = match group.dataset(name) {
        Ok(dataset) => dataset,
        Err(_) => group
            .new_dataset::<VarLenUnicode>()
            .shape((0..,))
            .chunk((SCALAR_CHUNK,))
            .create(name)?,
    };
    let offset = dataset.shape()[0];
    dataset.resize((offset + 1,))?;
    dataset.write_slice(ArrayView1::from(&[encoded][..]), s![offset..offset + 1])?;
    Ok(())
}

pub(crate) fn set_attr<T: H5Type>(group: &Group, name: &str, value: T) -> Result<()> {
    group.new_attr::<T>().create(name)?.write_scalar(&value)?;
    Ok(())
}

pub(crate) fn set_attr_str(group: &Group, name: &str, value: &str) -> Result<()> {
    let encoded = to_unicode(value)?;
    group
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&encoded)?;
    Ok(())
}

pub(crate) fn to_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 string: {e}")))
}
