//! Layer-selection routing between the pipeline and a writer backend.

use std::path::Path;

use log::debug;
use serde::Deserialize;

use showerpipe_core::{
    ArrayEvent, AtmosphereModel, ShowerArray, SimulationConfig, SubarrayDescription,
};

use crate::source::Metaparam;
use crate::writer::{create_writer, RecordWriter};
use crate::Result;

/// Data writer configuration, one section of the pipeline JSON.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[allow(clippy::struct_excessive_bools)]
pub struct DataWriterConfig {
    /// Backend name.
    pub output_type: String,
    /// Truncate an existing output instead of refusing to open it.
    pub overwrite: bool,
    pub write_simulation_shower: bool,
    pub write_simulated_camera: bool,
    pub write_simulated_camera_image: bool,
    pub write_r0: bool,
    pub write_r1: bool,
    pub write_dl0: bool,
    pub write_dl1: bool,
    pub write_dl1_image: bool,
    pub write_dl2: bool,
    pub write_monitor: bool,
    pub write_pointing: bool,
    pub write_subarray: bool,
    pub write_simulation_config: bool,
    pub write_atmosphere_model: bool,
    pub write_metaparam: bool,
}

impl Default for DataWriterConfig {
    fn default() -> Self {
        Self {
            output_type: "hdf5".to_string(),
            overwrite: true,
            write_simulation_shower: true,
            write_simulated_camera: true,
            write_simulated_camera_image: false,
            write_r0: false,
            write_r1: false,
            write_dl0: false,
            write_dl1: true,
            write_dl1_image: true,
            write_dl2: true,
            write_monitor: false,
            write_pointing: true,
            write_subarray: true,
            write_simulation_config: false,
            write_atmosphere_model: false,
            write_metaparam: false,
        }
    }
}

/// Run-level context handed to the writer at open time.
pub struct RunHeader<'a> {
    pub subarray: &'a SubarrayDescription,
    pub simulation_config: Option<&'a SimulationConfig>,
    pub atmosphere_model: Option<&'a AtmosphereModel>,
    pub metaparam: &'a Metaparam,
}

/// Routes enabled event layers to the configured backend.
///
/// Owns the output from `new` until `close`; one-shot records are
/// written at open time.
pub struct DataWriter {
    config: DataWriterConfig,
    writer: Box<dyn RecordWriter>,
    closed: bool,
}

impl DataWriter {
    /// Open the output and emit the enabled one-shot records.
    ///
    /// # Errors
    /// Backend construction and open failures, including an existing
    /// output without `overwrite`.
    pub fn new(config: DataWriterConfig, path: &Path, header: &RunHeader<'_>) -> Result<Self> {
        let mut writer = create_writer(&config.output_type, path)?;
        writer.open(config.overwrite)?;

        if config.write_atmosphere_model {
            if let Some(model) = header.atmosphere_model {
                writer.write_atmosphere_model(model)?;
            }
        }
        if config.write_subarray {
            writer.write_subarray(header.subarray)?;
        }
        if config.write_simulation_config {
            if let Some(sim_config) = header.simulation_config {
                writer.write_simulation_config(sim_config)?;
            }
        }
        if config.write_metaparam {
            writer.write_metaparam(header.metaparam)?;
        }

        Ok(Self {
            config,
            writer,
            closed: false,
        })
    }

    /// Write the enabled layers present on the event.
    pub fn apply(&mut self, event: &ArrayEvent) -> Result<()> {
        debug_assert!(!self.closed);
        if self.config.write_simulation_shower && event.simulation.is_some() {
            self.writer.write_simulation_shower(event)?;
        }
        if self.config.write_simulated_camera
            && event.simulation.as_ref().is_some_and(|s| !s.tels.is_empty())
        {
            self.writer
                .write_simulated_camera(event, self.config.write_simulated_camera_image)?;
        }
        if self.config.write_r0 && event.r0.is_some() {
            self.writer.write_r0(event)?;
        }
        if self.config.write_r1 && event.r1.is_some() {
            self.writer.write_r1(event)?;
        }
        if self.config.write_dl0 && event.dl0.is_some() {
            self.writer.write_dl0(event)?;
        }
        if self.config.write_dl1 && event.dl1.is_some() {
            self.writer.write_dl1(event, self.config.write_dl1_image)?;
        }
        if self.config.write_dl2 && event.dl2.is_some() {
            self.writer.write_dl2(event)?;
        }
        if self.config.write_monitor && event.monitor.is_some() {
            self.writer.write_monitor(event)?;
        }
        if self.config.write_pointing && event.pointing.is_some() {
            self.writer.write_pointing(event)?;
        }
        debug!("wrote event {}", event.event_id);
        Ok(())
    }

    /// Write the bulk shower truth; call once before `close`.
    pub fn write_shower_array(&mut self, showers: &ShowerArray) -> Result<()> {
        if self.config.write_simulation_shower && !showers.is_empty() {
            self.writer.write_shower_array(showers)?;
        }
        Ok(())
    }

    /// Finalize indexes and flush the output.
    pub fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.writer.close()?;
            self.closed = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdf5::File;
    use showerpipe_core::{Dl1Camera, PointingEvent, SimulationEvent};
    use tempfile::tempdir;

    fn subarray() -> SubarrayDescription {
        SubarrayDescription::new("array", [0.0, 0.0, 1800.0])
    }

    fn header<'a>(
        subarray: &'a SubarrayDescription,
        metaparam: &'a Metaparam,
    ) -> RunHeader<'a> {
        RunHeader {
            subarray,
            simulation_config: None,
            atmosphere_model: None,
            metaparam,
        }
    }

    #[test]
    fn test_disabled_layers_are_not_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.h5");
        let subarray = subarray();
        let metaparam = Metaparam::default();

        let config = DataWriterConfig {
            write_dl1: false,
            write_pointing: false,
            write_simulation_shower: false,
            write_simulated_camera: false,
            ..Default::default()
        };
        let mut writer = DataWriter::new(config, &path, &header(&subarray, &metaparam)).unwrap();

        let mut event = ArrayEvent::new(1, 1);
        event.dl1_mut().tels.insert(1, Dl1Camera::default());
        event.pointing = Some(PointingEvent::default());
        event.simulation = Some(SimulationEvent::default());
        writer.apply(&event).unwrap();
        writer.close().unwrap();

        let file = File::open(&path).unwrap();
        assert!(file.group("events/dl1").is_err());
        assert!(file.group("events/pointing").is_err());
        assert!(file.group("events/simulation").is_err());
        // Subarray is on by default.
        assert!(file.group("subarray").is_ok());
    }

    #[test]
    fn test_enabled_layers_are_routed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.h5");
        let subarray = subarray();
        let metaparam = Metaparam {
            entries: vec![("origin".to_string(), "test".to_string())],
        };

        let config = DataWriterConfig {
            write_metaparam: true,
            ..Default::default()
        };
        let mut writer = DataWriter::new(config, &path, &header(&subarray, &metaparam)).unwrap();

        let mut event = ArrayEvent::new(5, 1);
        let mut camera = Dl1Camera::default();
        camera.image = vec![1.0; 4];
        camera.peak_time = vec![0.0; 4];
        camera.mask = vec![false; 4];
        event.dl1_mut().tels.insert(2, camera);
        let mut pointing = PointingEvent::default();
        pointing.array_altitude = 1.4;
        event.pointing = Some(pointing);
        writer.apply(&event).unwrap();
        writer.close().unwrap();

        let file = File::open(&path).unwrap();
        assert_eq!(
            file.group("events/dl1")
                .unwrap()
                .dataset("event_id")
                .unwrap()
                .read_raw::<u64>()
                .unwrap(),
            vec![5]
        );
        assert_eq!(
            file.group("events/pointing")
                .unwrap()
                .dataset("array_altitude")
                .unwrap()
                .read_raw::<f64>()
                .unwrap(),
            vec![1.4]
        );
        let keys = file
            .group("cfg/metaparam")
            .unwrap()
            .dataset("key")
            .unwrap()
            .read_raw::<hdf5::types::VarLenUnicode>()
            .unwrap();
        assert_eq!(keys[0].as_str(), "origin");
    }

    #[test]
    fn test_existing_output_without_overwrite_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.h5");
        std::fs::write(&path, b"occupied").unwrap();
        let subarray = subarray();
        let metaparam = Metaparam::default();

        let config = DataWriterConfig {
            overwrite: false,
            ..Default::default()
        };
        let err = DataWriter::new(config, &path, &header(&subarray, &metaparam)).unwrap_err();
        assert!(matches!(err, crate::Error::AlreadyExists(_)));
    }
}
