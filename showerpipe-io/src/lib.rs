//! showerpipe-io: Event sources and output writers.
//!
//! Defines the `EventSource` contract the pipeline consumes, the
//! `RecordWriter` backend contract with an HDF5 implementation, and the
//! `DataWriter` that routes enabled data levels to a backend.

pub mod data_writer;
pub mod error;
pub mod hdf5;
pub mod hdf5_source;
pub mod source;
pub mod writer;

pub use data_writer::{DataWriter, DataWriterConfig, RunHeader};
pub use error::{Error, Result};
pub use hdf5::Hdf5Writer;
pub use hdf5_source::Hdf5EventSource;
pub use source::{EventSource, Metaparam};
pub use writer::{create_writer, RecordWriter};
