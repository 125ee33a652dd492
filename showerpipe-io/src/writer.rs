//! Writer backend contract and factory.

use std::path::Path;

use showerpipe_core::{
    ArrayEvent, AtmosphereModel, ShowerArray, SimulationConfig, SubarrayDescription,
};

use crate::hdf5::Hdf5Writer;
use crate::source::Metaparam;
use crate::{Error, Result};

/// A format backend for the data writer.
///
/// Backends are stateful: `open` before any write, `close` exactly
/// once at the end; `close` flushes and finalizes indexes. Callers must
/// not use a writer after `close`.
pub trait RecordWriter {
    /// Open the output; `overwrite` controls whether an existing file
    /// is truncated or refused.
    fn open(&mut self, overwrite: bool) -> Result<()>;

    /// Finalize indexes and flush.
    fn close(&mut self) -> Result<()>;

    /// One-shot: telescope array description.
    fn write_subarray(&mut self, subarray: &SubarrayDescription) -> Result<()>;

    /// One-shot: simulation run header.
    fn write_simulation_config(&mut self, config: &SimulationConfig) -> Result<()>;

    /// One-shot: atmosphere profile table.
    fn write_atmosphere_model(&mut self, model: &AtmosphereModel) -> Result<()>;

    /// One-shot: source metadata.
    fn write_metaparam(&mut self, metaparam: &Metaparam) -> Result<()>;

    /// Bulk per-shower truth, written at close time.
    fn write_shower_array(&mut self, showers: &ShowerArray) -> Result<()>;

    /// Per-event true shower record.
    fn write_simulation_shower(&mut self, event: &ArrayEvent) -> Result<()>;

    /// Per-telescope simulation truth; `with_image` adds the true
    /// photo-electron image.
    fn write_simulated_camera(&mut self, event: &ArrayEvent, with_image: bool) -> Result<()>;

    /// Raw waveforms.
    fn write_r0(&mut self, event: &ArrayEvent) -> Result<()>;

    /// Calibrated waveforms.
    fn write_r1(&mut self, event: &ArrayEvent) -> Result<()>;

    /// Reduced images.
    fn write_dl0(&mut self, event: &ArrayEvent) -> Result<()>;

    /// Image parameters; `with_image` adds image, peak time, and mask.
    fn write_dl1(&mut self, event: &ArrayEvent, with_image: bool) -> Result<()>;

    /// Reconstructed geometry and impact parameters.
    fn write_dl2(&mut self, event: &ArrayEvent) -> Result<()>;

    /// Calibration monitoring.
    fn write_monitor(&mut self, event: &ArrayEvent) -> Result<()>;

    /// Array and telescope pointing.
    fn write_pointing(&mut self, event: &ArrayEvent) -> Result<()>;
}

/// Construct a writer backend by name.
///
/// # Errors
/// `Error::UnknownBackend` for unregistered output types.
pub fn create_writer(output_type: &str, path: &Path) -> Result<Box<dyn RecordWriter>> {
    match output_type {
        "hdf5" => Ok(Box::new(Hdf5Writer::new(path))),
        other => Err(Error::UnknownBackend {
            kind: "output type",
            name: other.to_string(),
        }),
    }
}
