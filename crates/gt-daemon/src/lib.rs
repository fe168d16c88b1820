//! Background location-tracking daemon.
//!
//! The daemon keeps location updates flowing while the host tries to kill it:
//! - A foreground tracking service with a persisted start/stop intent
//! - Restart alarms that relaunch the service after the host kills it
//! - A continuous fix subscription plus a bounded one-shot bootstrap fetch
//! - A single-slot fix stream for an ephemeral UI listener

pub mod control;
pub mod daemon;
pub mod environment;
pub mod fix_stream;
pub mod host;
pub mod pipeline;
pub mod provider;
pub mod restart;
pub mod service;
pub mod shutdown;
pub mod signals;
