//! # aerosec
//!
//! Synthetic ADS-B and ARINC 429 telemetry with unsupervised anomaly detection.
//!
//! The crate generates labeled telemetry from parametric physical models, fits a
//! feature scaler and an unsupervised detector (isolation forest or one-class SVM)
//! on the unlabeled features, and evaluates the predictions against ground truth.
//! Streaming generators drive a cancellable mission loop, and notable facts are
//! published as structured events through an injected sink.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod mission;
pub mod ml;
pub mod pipeline;
pub mod report;
pub mod telemetry;

pub use config::SimConfig;
pub use error::{Error, Result};
pub use events::{EventSink, SharedSink, SimEvent};
pub use pipeline::{run_adsb, run_avionics, Evaluation, PipelineKind};
