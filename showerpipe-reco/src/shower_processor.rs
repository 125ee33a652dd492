//! Dispatches the configured reconstructors over each event.

use log::info;
use serde::Deserialize;

use showerpipe_core::{ArrayEvent, AtmosphereModel, SubarrayDescription};

use crate::hillas::ReconstructorConfig;
use crate::registry::ReconstructorRegistry;
use crate::Reconstructor;

/// Shower processor configuration, one section of the pipeline JSON.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShowerProcessorConfig {
    /// Reconstructors to run, in order.
    #[serde(rename = "GeometryReconstructionTypes")]
    pub geometry_reconstruction_types: Vec<String>,
    /// Settings for the Hillas reconstructor.
    #[serde(rename = "HillasReconstructor")]
    pub hillas: ReconstructorConfig,
}

impl Default for ShowerProcessorConfig {
    fn default() -> Self {
        Self {
            geometry_reconstruction_types: vec!["HillasReconstructor".to_string()],
            hillas: ReconstructorConfig::default(),
        }
    }
}

/// Runs every configured reconstructor on each event.
pub struct ShowerProcessor {
    reconstructors: Vec<Box<dyn Reconstructor>>,
    atmosphere: Option<AtmosphereModel>,
}

impl ShowerProcessor {
    /// Build all configured reconstructors through the registry.
    ///
    /// # Errors
    /// Fails on unknown reconstructor names or unparseable queries.
    pub fn new(
        config: &ShowerProcessorConfig,
        atmosphere: Option<AtmosphereModel>,
    ) -> showerpipe_core::Result<Self> {
        let registry = ReconstructorRegistry::default();
        let mut reconstructors = Vec::new();
        for name in &config.geometry_reconstruction_types {
            reconstructors.push(registry.build(name, &config.hillas)?);
        }
        info!(
            "shower processor with {} reconstructor(s): {:?}",
            reconstructors.len(),
            config.geometry_reconstruction_types
        );
        Ok(Self {
            reconstructors,
            atmosphere,
        })
    }

    /// Run every reconstructor on the event.
    pub fn apply(&self, subarray: &SubarrayDescription, event: &mut ArrayEvent) {
        for reconstructor in &self.reconstructors {
            reconstructor.apply(subarray, self.atmosphere.as_ref(), event);
        }
    }
}
