//! Logging setup and span helpers for geotrack.
//!
//! - **Logging**: human-readable or JSON output via `tracing-subscriber`,
//!   selected from the `[general]` config section.
//! - **Spans**: trace-id tagged spans wrapped around each control transition
//!   so a start/stop and everything it triggers share one correlation id.

pub mod logging;
pub mod spans;
