//! Bounded-time network performance probe.
//!
//! One run measures round-trip latency, download throughput and upload
//! throughput against HTTP endpoints, in that order. Network failures never
//! surface as errors: each metric of [`MeasurementResult`] is simply absent.
//! Only invalid [`Settings`] fail loudly.

pub mod error;
pub mod logging;
pub mod settings;
pub mod speedtest;

pub use error::{ProbeError, SettingsError};
pub use settings::Settings;
pub use speedtest::download::DownloadProgress;
pub use speedtest::upload::{UploadStage, UploadTrial};
pub use speedtest::{run_probe, MeasurementResult, ProbeEvent, Prober, TestPhase};
