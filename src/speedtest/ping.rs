use super::deadline::Deadline;
use super::request::Endpoint;
use crate::error::PhaseError;
use reqwest::{Client, Method};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Single round-trip latency probe: one HEAD request, timed until the
/// response headers arrive.
#[derive(Debug, Clone)]
pub struct LatencyProbe {
    client: Client,
    endpoint: Endpoint,
    timeout: Duration,
}

impl LatencyProbe {
    pub fn new(client: Client, endpoint: Endpoint, timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            timeout,
        }
    }

    /// Milliseconds until the response arrived, or `None` on any failure.
    pub async fn run(&self, cancel: &CancellationToken) -> Option<f64> {
        match self.measure(cancel).await {
            Ok(ms) => {
                info!(ping_ms = ms, "latency probe complete");
                Some(ms)
            }
            Err(err) => {
                warn!(endpoint = %self.endpoint, error = %err, "latency probe failed");
                None
            }
        }
    }

    async fn measure(&self, cancel: &CancellationToken) -> Result<f64, PhaseError> {
        let deadline = Deadline::new(self.timeout, cancel);
        let request = self.endpoint.request(&self.client, Method::HEAD);

        let start = Instant::now();
        let response = deadline.run(request.send()).await??;
        let elapsed = start.elapsed();

        // Any response counts; the status is only informational.
        debug!(status = %response.status(), ?elapsed, "latency probe response");
        Ok(elapsed.as_secs_f64() * 1000.0)
    }
}
