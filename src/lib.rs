// THEORY:
// This file is the main entry point for the `pan_sentry` library crate. It
// exports the `TrackingPipeline` session object and its configuration as the
// high-level interface, together with the stream driver that runs a pipeline
// against a frame source and a display surface.
//
// The per-frame stages live in `core_modules`; the adapters to cameras, image
// sequences and the servo's serial link live in `devices`. The binary in
// `main.rs` only wires configuration and devices together.

pub mod config;
pub mod core_modules;
pub mod devices;
pub mod error;
pub mod pipeline;
pub mod stream;

pub use error::{Error, Result};
pub use pipeline::{PipelineConfig, Report, TrackingPipeline};
