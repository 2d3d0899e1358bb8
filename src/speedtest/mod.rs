pub(crate) mod deadline;
pub mod download;
pub mod ping;
pub mod request;
pub mod upload;

use crate::error::ProbeError;
use crate::settings::Settings;
use download::{DownloadProgress, DownloadSampler};
use ping::LatencyProbe;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use upload::{UploadEstimator, UploadStage, UploadTrial};

/// Outcome of one probe run. Each metric is `None` when its phase failed,
/// independently of the others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    download_mbps: Option<f64>,
    upload_mbps: Option<f64>,
    ping_ms: Option<f64>,
}

impl MeasurementResult {
    pub fn new(download_mbps: Option<f64>, upload_mbps: Option<f64>, ping_ms: Option<f64>) -> Self {
        Self {
            download_mbps,
            upload_mbps,
            ping_ms,
        }
    }

    pub fn download_mbps(&self) -> Option<f64> {
        self.download_mbps
    }

    pub fn upload_mbps(&self) -> Option<f64> {
        self.upload_mbps
    }

    pub fn ping_ms(&self) -> Option<f64> {
        self.ping_ms
    }

    pub fn is_empty(&self) -> bool {
        self.download_mbps.is_none() && self.upload_mbps.is_none() && self.ping_ms.is_none()
    }
}

impl fmt::Display for MeasurementResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn field(value: Option<f64>, precision: usize) -> String {
            value.map_or_else(|| "?".to_string(), |v| format!("{v:.precision$}"))
        }

        write!(
            f,
            "DL: {} | UL: {} | Ping: {}",
            field(self.download_mbps, 1),
            field(self.upload_mbps, 1),
            field(self.ping_ms, 0)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    Idle,
    Ping,
    Download,
    Upload,
    Complete,
}

#[derive(Debug, Clone)]
pub enum ProbeEvent {
    PhaseStarted(TestPhase),
    LatencyMeasured(Option<f64>),
    DownloadProgress(DownloadProgress),
    DownloadComplete(Option<f64>),
    UploadTrialFinished { stage: UploadStage, trial: UploadTrial },
    UploadComplete(Option<f64>),
    Finished(MeasurementResult),
}

/// Non-blocking event reporting. A full or closed channel drops the event.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EventSink<'a>(Option<&'a mpsc::Sender<ProbeEvent>>);

impl<'a> EventSink<'a> {
    pub fn new(tx: Option<&'a mpsc::Sender<ProbeEvent>>) -> Self {
        Self(tx)
    }

    #[cfg(test)]
    pub fn none() -> Self {
        Self(None)
    }

    pub fn is_active(&self) -> bool {
        self.0.is_some()
    }

    pub fn emit(&self, event: ProbeEvent) {
        if let Some(tx) = self.0 {
            let _ = tx.try_send(event);
        }
    }
}

/// Megabits per second, or `None` when nothing was transferred or no time
/// elapsed.
pub(crate) fn throughput_mbps(bytes: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if bytes == 0 || secs <= 0.0 {
        return None;
    }
    let mbps = bytes as f64 * 8.0 / 1_000_000.0 / secs;
    mbps.is_finite().then_some(mbps)
}

/// Runs latency, download and upload phases in that order against the
/// configured endpoints.
///
/// Holds no per-run state, so one `Prober` may serve concurrent runs.
#[derive(Debug, Clone)]
pub struct Prober {
    latency: LatencyProbe,
    download: DownloadSampler,
    upload: UploadEstimator,
}

impl Prober {
    /// Validates `settings` and builds the HTTP client. This is the only
    /// place a probe can fail.
    pub fn new(settings: Settings) -> Result<Self, ProbeError> {
        settings.validate()?;
        let client = request::build_client(&settings).map_err(ProbeError::Client)?;

        let latency = LatencyProbe::new(
            client.clone(),
            settings.ping_endpoint()?,
            settings.ping_timeout(),
        );
        let download = DownloadSampler::new(
            client.clone(),
            settings.download_endpoint()?,
            settings.download_duration(),
            settings.download_hard_timeout(),
        );
        let upload = UploadEstimator::new(client, settings.upload_endpoint()?, (&settings).into());

        Ok(Self {
            latency,
            download,
            upload,
        })
    }

    pub async fn run(&self) -> MeasurementResult {
        self.run_with(None, CancellationToken::new()).await
    }

    /// Like [`Prober::run`], reporting progress on `events` and stopping any
    /// in-flight request once `cancel` fires. Cancelled phases report `None`.
    pub async fn run_with(
        &self,
        events: Option<mpsc::Sender<ProbeEvent>>,
        cancel: CancellationToken,
    ) -> MeasurementResult {
        let sink = EventSink::new(events.as_ref());

        sink.emit(ProbeEvent::PhaseStarted(TestPhase::Ping));
        let ping_ms = self.latency.run(&cancel).await;
        sink.emit(ProbeEvent::LatencyMeasured(ping_ms));

        sink.emit(ProbeEvent::PhaseStarted(TestPhase::Download));
        let download_mbps = self.download.run(&cancel, sink).await;
        sink.emit(ProbeEvent::DownloadComplete(download_mbps));

        sink.emit(ProbeEvent::PhaseStarted(TestPhase::Upload));
        let upload_mbps = self.upload.run(&cancel, sink).await;
        sink.emit(ProbeEvent::UploadComplete(upload_mbps));

        let result = MeasurementResult::new(download_mbps, upload_mbps, ping_ms);
        if result.is_empty() {
            debug!("probe finished without any measurement");
        }
        info!(%result, "probe complete");

        sink.emit(ProbeEvent::PhaseStarted(TestPhase::Complete));
        sink.emit(ProbeEvent::Finished(result));
        result
    }
}

/// Validate `settings`, run one probe, and return its result.
pub async fn run_probe(settings: Settings) -> Result<MeasurementResult, ProbeError> {
    let prober = Prober::new(settings)?;
    Ok(prober.run().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throughput_guards_degenerate_inputs() {
        assert_eq!(throughput_mbps(0, Duration::from_secs(1)), None);
        assert_eq!(throughput_mbps(50_000_000, Duration::ZERO), None);
        assert_eq!(throughput_mbps(1_000_000, Duration::from_secs(8)), Some(1.0));
    }

    #[test]
    fn display_marks_missing_values() {
        let result = MeasurementResult::new(Some(94.123), None, Some(23.6));
        assert_eq!(result.to_string(), "DL: 94.1 | UL: ? | Ping: 24");
        assert_eq!(
            MeasurementResult::default().to_string(),
            "DL: ? | UL: ? | Ping: ?"
        );
    }

    #[test]
    fn serializes_missing_values_as_null() {
        let result = MeasurementResult::new(None, Some(12.5), None);
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "download_mbps": null, "upload_mbps": 12.5, "ping_ms": null })
        );
    }

    #[test]
    fn empty_only_when_all_fields_missing() {
        assert!(MeasurementResult::default().is_empty());
        assert!(!MeasurementResult::new(None, None, Some(1.0)).is_empty());
    }

    #[tokio::test]
    async fn full_channel_never_blocks() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = EventSink::new(Some(&tx));
        sink.emit(ProbeEvent::LatencyMeasured(Some(1.0)));
        sink.emit(ProbeEvent::LatencyMeasured(Some(2.0)));
        assert!(matches!(
            rx.recv().await,
            Some(ProbeEvent::LatencyMeasured(Some(v))) if v == 1.0
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn invalid_settings_fail_construction() {
        let settings = Settings {
            download_url: "mailto:nobody@example.com".to_string(),
            ..Settings::default()
        };
        assert!(matches!(Prober::new(settings), Err(ProbeError::Settings(_))));
    }
}
