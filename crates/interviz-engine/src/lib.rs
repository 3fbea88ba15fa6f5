//! Interviz Engine - Geoprocessing port, workspace lifecycle, and job dispatch
//!
//! This crate drives the external geoprocessing engine. It owns the shared
//! workspace, runs jobs in a fixed pool of workers and keeps concurrent jobs
//! from observing each other's computational region.

pub mod dispatcher;
pub mod executor;
pub mod grass;
pub mod memory;
pub mod metadata;
pub mod policy;
pub mod ports;
pub mod wind;
pub mod workspace;

pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherStats};
pub use executor::JobExecutor;
pub use grass::GrassEngine;
pub use memory::MemoryEngine;
pub use ports::{Engine, EngineSpace, SunmaskRequest, ViewshedRequest};
pub use workspace::Workspace;
