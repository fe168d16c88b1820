//! Core data model, configuration, and durable control-state for geotrack.
//!
//! Everything in this crate is runtime-agnostic: no tokio, no provider or
//! host seams. The daemon crate builds the service lifecycle on top of it.

pub mod config;
pub mod store;
pub mod types;
