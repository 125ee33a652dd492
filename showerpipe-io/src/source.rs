//! Event source contract.
//!
//! The binary parser for raw simulation records is an external
//! collaborator; anything that can iterate `ArrayEvent`s and describe
//! its array can feed the pipeline.

use showerpipe_core::{
    ArrayEvent, AtmosphereModel, ShowerArray, SimulationConfig, SubarrayDescription,
};

use crate::Result;

/// Free-form provenance strings carried by a source.
#[derive(Clone, Debug, Default)]
pub struct Metaparam {
    /// Ordered key/value pairs.
    pub entries: Vec<(String, String)>,
}

/// A stream of array events plus the run-level context around them.
pub trait EventSource: Iterator<Item = Result<ArrayEvent>> {
    /// The telescope array this stream was recorded with.
    fn subarray(&self) -> &SubarrayDescription;

    /// Simulation run header, when the input is simulated.
    fn simulation_config(&self) -> Option<&SimulationConfig>;

    /// Atmosphere profile, when available.
    fn atmosphere_model(&self) -> Option<&AtmosphereModel>;

    /// Source metadata.
    fn metaparam(&self) -> &Metaparam;

    /// Bulk per-shower truth for the whole run.
    fn shower_array(&self) -> &ShowerArray;
}
