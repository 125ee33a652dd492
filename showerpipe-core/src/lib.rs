//! showerpipe-core: Data model for air-shower event reconstruction.
//!
//! This crate provides the shared types the pipeline stages exchange:
//! camera geometry with neighbor adjacency, the subarray description,
//! the array event with its optional data levels, DL1 image parameters,
//! and DL2 reconstruction products.

pub mod camera;
pub mod coords;
pub mod dl2;
pub mod error;
pub mod event;
pub mod params;
pub mod simulation;
pub mod subarray;

pub use camera::{CameraGeometry, NeighborMatrix, PixelShape};
pub use coords::{Horizontal, NominalFrame};
pub use dl2::{
    Dl2Event, Dl2TelescopeData, ImpactParameter, ParticleClassification, ReconstructedEnergy,
    ReconstructedGeometry,
};
pub use error::{ConfigError, Error, EventError, GeometryError, Result};
pub use event::{
    ArrayEvent, Dl0Camera, Dl0Event, Dl1Camera, Dl1Event, MonitorEvent, PointingEvent, R0Camera,
    R0Event, R1Camera, R1Event, TelescopeMonitor, TelescopePointing,
};
pub use params::{
    ConcentrationParameters, ExtraParameters, HillasParameters, ImageParameters,
    IntensityParameters, LeakageParameters, MorphologyParameters,
};
pub use simulation::{
    AtmosphereModel, ShowerArray, SimulatedCamera, SimulatedShower, SimulationConfig,
    SimulationEvent,
};
pub use subarray::{
    CameraDescription, CameraReadout, OpticsDescription, SubarrayDescription, TelId,
    TelescopeDescription,
};
