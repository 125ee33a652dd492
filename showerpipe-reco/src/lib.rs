//! showerpipe-reco: Stereoscopic shower geometry reconstruction.
//!
//! Combines per-telescope image ellipses into a single shower direction
//! and core via weighted great-circle intersections, and dispatches the
//! configured reconstructors per event.

pub mod hillas;
pub mod registry;
pub mod shower_processor;

use showerpipe_core::{ArrayEvent, AtmosphereModel, SubarrayDescription};

pub use hillas::{HillasReconstructor, ReconstructorConfig, TelescopeInput};
pub use registry::ReconstructorRegistry;
pub use shower_processor::{ShowerProcessor, ShowerProcessorConfig};

/// A geometry reconstructor: fills one named DL2 geometry entry per
/// event.
pub trait Reconstructor: std::fmt::Debug + Send + Sync {
    /// Instance name; keys the DL2 geometry map.
    fn name(&self) -> &str;

    /// Reconstruct this event, writing into its DL2 layer. Degenerate
    /// events produce `is_valid = false`, never an error.
    fn apply(
        &self,
        subarray: &SubarrayDescription,
        atmosphere: Option<&AtmosphereModel>,
        event: &mut ArrayEvent,
    );
}
