//! Interviz Geo - Request validation, CRS transforms, and raster vectorization
//!
//! This crate holds the pure geospatial pieces of the service: checking
//! untrusted request parameters against the raster domain, projecting
//! between geographic and native coordinates, and turning a binary raster
//! into a GeoJSON feature collection.

pub mod features;
pub mod polygonize;
pub mod raster;
pub mod transform;
pub mod validation;
