//! Interviz Core - Domain models, errors, and configuration
//!
//! This crate contains the shared domain types used by the validators, the
//! job engine and the HTTP service.

pub mod config;
pub mod error;
pub mod models;

pub use error::{InterVizError, Result};
