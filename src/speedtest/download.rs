use super::deadline::Deadline;
use super::request::Endpoint;
use super::{throughput_mbps, EventSink, ProbeEvent};
use crate::error::PhaseError;
use futures::{Stream, StreamExt};
use reqwest::{Client, Method};
use std::pin::pin;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);
const MAX_SAMPLES: usize = 200;

/// Streams a large body for a bounded window and derives throughput from
/// what arrived.
#[derive(Debug, Clone)]
pub struct DownloadSampler {
    client: Client,
    endpoint: Endpoint,
    max_duration: Duration,
    hard_timeout: Duration,
}

impl DownloadSampler {
    pub fn new(
        client: Client,
        endpoint: Endpoint,
        max_duration: Duration,
        hard_timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint,
            max_duration,
            hard_timeout,
        }
    }

    pub(crate) async fn run(
        &self,
        cancel: &CancellationToken,
        events: EventSink<'_>,
    ) -> Option<f64> {
        let sample = match self.measure(cancel, events).await {
            Ok(sample) => sample,
            Err(err) => {
                warn!(endpoint = %self.endpoint, error = %err, "download failed");
                return None;
            }
        };

        match sample.mbps() {
            Some(mbps) => {
                info!(
                    download_mbps = mbps,
                    bytes = sample.received_bytes,
                    elapsed = ?sample.elapsed,
                    stopped_early = sample.stopped_early,
                    "download complete"
                );
                Some(mbps)
            }
            None => {
                warn!(
                    bytes = sample.received_bytes,
                    elapsed = ?sample.elapsed,
                    "download produced no measurable throughput"
                );
                None
            }
        }
    }

    async fn measure(
        &self,
        cancel: &CancellationToken,
        events: EventSink<'_>,
    ) -> Result<StreamSample, PhaseError> {
        let hard = Deadline::new(self.hard_timeout, cancel);
        let request = self.endpoint.request(&self.client, Method::GET);

        let response = hard.run(request.send()).await??;
        let status = response.status();
        if !status.is_success() {
            return Err(PhaseError::Status(status));
        }
        debug!(content_length = ?response.content_length(), "download streaming");

        sample_stream(response.bytes_stream(), self.max_duration, &hard, events).await
    }
}

#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub received_bytes: u64,
    pub elapsed: Duration,
    pub speed_samples: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StreamSample {
    pub received_bytes: u64,
    pub elapsed: Duration,
    /// The window ran out before the server finished the body.
    pub stopped_early: bool,
}

impl StreamSample {
    pub fn mbps(&self) -> Option<f64> {
        throughput_mbps(self.received_bytes, self.elapsed)
    }
}

/// Reads `body` chunk by chunk until it ends or `max_duration` has passed
/// since the first read was issued, whichever comes first. Returning drops
/// the stream, which cancels the rest of the body.
///
/// Every read is bounded by `deadline`; hitting it is an error, not a sample.
pub(crate) async fn sample_stream<S, B, E>(
    body: S,
    max_duration: Duration,
    deadline: &Deadline,
    events: EventSink<'_>,
) -> Result<StreamSample, PhaseError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    PhaseError: From<E>,
{
    let mut body = pin!(body);
    let mut meter = RateMeter::default();

    let start = Instant::now();
    let mut end;
    let mut received: u64 = 0;
    let mut stopped_early = false;

    loop {
        let next = deadline.run(body.next()).await?;
        end = Instant::now();

        let Some(chunk) = next else {
            break;
        };
        received += chunk?.as_ref().len() as u64;

        if events.is_active() {
            if let Some(progress) = meter.record(start, end, received) {
                events.emit(ProbeEvent::DownloadProgress(progress));
            }
        }

        if end.duration_since(start) > max_duration {
            stopped_early = true;
            break;
        }
    }

    Ok(StreamSample {
        received_bytes: received,
        elapsed: end.duration_since(start),
        stopped_early,
    })
}

/// Rolling per-interval throughput for progress display.
#[derive(Debug, Default)]
struct RateMeter {
    samples: Vec<f64>,
    last_update: Option<Instant>,
    last_received: u64,
}

impl RateMeter {
    fn record(&mut self, start: Instant, now: Instant, received: u64) -> Option<DownloadProgress> {
        let last_update = *self.last_update.get_or_insert(start);
        let interval = now.duration_since(last_update);
        if interval < SAMPLE_INTERVAL {
            return None;
        }

        let bytes_delta = received - self.last_received;
        self.samples.push(throughput_mbps(bytes_delta, interval).unwrap_or(0.0));
        if self.samples.len() > MAX_SAMPLES {
            self.samples.remove(0);
        }

        self.last_update = Some(now);
        self.last_received = received;

        Some(DownloadProgress {
            received_bytes: received,
            elapsed: now.duration_since(start),
            speed_samples: self.samples.clone(),
        })
    }
}
