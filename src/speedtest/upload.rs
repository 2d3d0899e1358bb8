use super::deadline::Deadline;
use super::request::Endpoint;
use super::{EventSink, ProbeEvent};
use crate::error::PhaseError;
use crate::settings::Settings;
use rand::RngCore;
use reqwest::{Client, Method};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Probe,
    Scaled,
}

/// One upload attempt of a fixed payload size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadTrial {
    pub payload_bytes: usize,
    pub elapsed_secs: f64,
    pub succeeded: bool,
}

impl UploadTrial {
    pub fn completed(payload_bytes: usize, elapsed: Duration) -> Self {
        Self {
            payload_bytes,
            elapsed_secs: elapsed.as_secs_f64(),
            succeeded: true,
        }
    }

    pub fn failed(payload_bytes: usize, elapsed: Duration) -> Self {
        Self {
            payload_bytes,
            elapsed_secs: elapsed.as_secs_f64(),
            succeeded: false,
        }
    }

    /// Only defined for successful trials that took measurable time.
    pub fn mbps(&self) -> Option<f64> {
        if !self.succeeded
            || self.payload_bytes == 0
            || self.elapsed_secs.is_nan()
            || self.elapsed_secs <= 0.0
        {
            return None;
        }
        let mbps = self.payload_bytes as f64 * 8.0 / 1_000_000.0 / self.elapsed_secs;
        mbps.is_finite().then_some(mbps)
    }
}

/// Sizing and deadline constants for the probe-then-scale strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPlan {
    pub probe_bytes: usize,
    pub probe_timeout: Duration,
    pub slow_threshold_secs: f64,
    pub target_secs: f64,
    pub max_bytes: usize,
    pub final_timeout: Duration,
}

impl From<&Settings> for UploadPlan {
    fn from(settings: &Settings) -> Self {
        Self {
            probe_bytes: settings.upload_probe_bytes,
            probe_timeout: settings.upload_probe_timeout(),
            slow_threshold_secs: settings.upload_slow_threshold_secs,
            target_secs: settings.upload_target_secs,
            max_bytes: settings.upload_max_bytes,
            final_timeout: settings.upload_final_timeout(),
        }
    }
}

impl Default for UploadPlan {
    fn default() -> Self {
        (&Settings::default()).into()
    }
}

impl UploadPlan {
    /// Payload that would take `target_secs` at `probe_mbps`, capped at
    /// `max_bytes` and never empty.
    pub fn scaled_bytes(&self, probe_mbps: f64) -> usize {
        let bytes = (probe_mbps * 1_000_000.0 / 8.0 * self.target_secs).floor();
        // `as` saturates, so an absurd rate still lands on the cap.
        (bytes as usize).min(self.max_bytes).max(1)
    }

    /// Run the probe trial, then decide whether a scaled trial is worth it.
    ///
    /// `run_trial` performs one upload of the given size under the given
    /// deadline.
    pub(crate) async fn estimate<F, Fut>(
        &self,
        mut run_trial: F,
        events: EventSink<'_>,
    ) -> Option<f64>
    where
        F: FnMut(usize, Duration) -> Fut,
        Fut: Future<Output = UploadTrial>,
    {
        let probe = run_trial(self.probe_bytes, self.probe_timeout).await;
        events.emit(ProbeEvent::UploadTrialFinished {
            stage: UploadStage::Probe,
            trial: probe,
        });

        let Some(probe_mbps) = probe.mbps() else {
            warn!(?probe, "upload probe failed");
            return None;
        };

        if probe.elapsed_secs > self.slow_threshold_secs {
            info!(
                upload_mbps = probe_mbps,
                elapsed_secs = probe.elapsed_secs,
                "slow link, reporting probe rate"
            );
            return Some(probe_mbps);
        }

        let target_bytes = self.scaled_bytes(probe_mbps);
        debug!(probe_mbps, target_bytes, "scaling up upload");

        let scaled = run_trial(target_bytes, self.final_timeout).await;
        events.emit(ProbeEvent::UploadTrialFinished {
            stage: UploadStage::Scaled,
            trial: scaled,
        });

        match scaled.mbps() {
            Some(mbps) => {
                info!(upload_mbps = mbps, bytes = target_bytes, "upload complete");
                Some(mbps)
            }
            None => {
                warn!(
                    ?scaled,
                    upload_mbps = probe_mbps,
                    "scaled upload trial failed, falling back to probe rate (degraded)"
                );
                Some(probe_mbps)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadEstimator {
    client: Client,
    endpoint: Endpoint,
    plan: UploadPlan,
}

impl UploadEstimator {
    pub fn new(client: Client, endpoint: Endpoint, plan: UploadPlan) -> Self {
        Self {
            client,
            endpoint,
            plan,
        }
    }

    pub(crate) async fn run(
        &self,
        cancel: &CancellationToken,
        events: EventSink<'_>,
    ) -> Option<f64> {
        self.plan
            .estimate(move |bytes, limit| self.trial(bytes, limit, cancel), events)
            .await
    }

    async fn trial(
        &self,
        bytes: usize,
        limit: Duration,
        cancel: &CancellationToken,
    ) -> UploadTrial {
        let payload = synthesize_payload(bytes);
        let deadline = Deadline::new(limit, cancel);

        let start = Instant::now();
        let outcome = self.send(payload, &deadline).await;
        let elapsed = start.elapsed();

        match outcome {
            Ok(()) => {
                debug!(bytes, ?elapsed, "upload trial complete");
                UploadTrial::completed(bytes, elapsed)
            }
            Err(err) => {
                warn!(endpoint = %self.endpoint, bytes, error = %err, "upload trial failed");
                UploadTrial::failed(bytes, elapsed)
            }
        }
    }

    async fn send(&self, payload: Vec<u8>, deadline: &Deadline) -> Result<(), PhaseError> {
        let request = self
            .endpoint
            .request(&self.client, Method::POST)
            .body(payload);

        // Any reply ends the trial; the status is only informational.
        let response = deadline.run(request.send()).await??;
        debug!(status = %response.status(), "upload trial response");
        Ok(())
    }
}

/// Random filler so nothing along the path can compress the payload.
fn synthesize_payload(bytes: usize) -> Vec<u8> {
    let mut payload = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut payload);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    const MIB: usize = 1024 * 1024;

    /// Scripted trial runner: pops pre-baked outcomes and records what was
    /// asked of it.
    #[derive(Clone, Default)]
    struct Script {
        outcomes: Arc<Mutex<Vec<(bool, f64)>>>,
        requests: Arc<Mutex<Vec<(usize, Duration)>>>,
    }

    impl Script {
        fn new(outcomes: &[(bool, f64)]) -> Self {
            let mut outcomes = outcomes.to_vec();
            outcomes.reverse();
            Self {
                outcomes: Arc::new(Mutex::new(outcomes)),
                requests: Arc::default(),
            }
        }

        fn runner(&self) -> impl FnMut(usize, Duration) -> std::future::Ready<UploadTrial> + '_ {
            move |bytes, limit| {
                self.requests.lock().unwrap().push((bytes, limit));
                let (succeeded, elapsed_secs) = self.outcomes.lock().unwrap().pop().unwrap();
                std::future::ready(UploadTrial {
                    payload_bytes: bytes,
                    elapsed_secs,
                    succeeded,
                })
            }
        }

        fn requests(&self) -> Vec<(usize, Duration)> {
            self.requests.lock().unwrap().clone()
        }
    }

    fn rate(bytes: usize, secs: f64) -> f64 {
        bytes as f64 * 8.0 / 1_000_000.0 / secs
    }

    #[test]
    fn trial_rate_matches_formula() {
        let trial = UploadTrial::completed(2 * MIB, Duration::from_secs(1));
        assert_eq!(trial.mbps(), Some(2.0 * MIB as f64 * 8.0 / 1_000_000.0));
        assert_eq!(UploadTrial::failed(2 * MIB, Duration::from_secs(1)).mbps(), None);
        assert_eq!(UploadTrial::completed(2 * MIB, Duration::ZERO).mbps(), None);
    }

    #[test]
    fn scaled_size_targets_four_seconds() {
        let plan = UploadPlan::default();
        // 8 Mbps for 4 s is 4 MB.
        assert_eq!(plan.scaled_bytes(8.0), 4_000_000);
    }

    #[test]
    fn scaled_size_survives_zero_ceiling() {
        let plan = UploadPlan {
            max_bytes: 0,
            ..UploadPlan::default()
        };
        assert_eq!(plan.scaled_bytes(8.0), 1);
        assert_eq!(plan.scaled_bytes(0.0), 1);
    }

    #[test]
    fn scaled_size_is_capped() {
        let plan = UploadPlan::default();
        assert_eq!(plan.scaled_bytes(10_000.0), 20 * MIB);
        assert_eq!(plan.scaled_bytes(f64::MAX), 20 * MIB);
    }

    #[tokio::test]
    async fn failed_probe_yields_nothing() {
        let script = Script::new(&[(false, 5.0)]);
        let plan = UploadPlan::default();
        assert_eq!(plan.estimate(script.runner(), EventSink::none()).await, None);
        assert_eq!(script.requests().len(), 1);
    }

    #[tokio::test]
    async fn slow_probe_is_reported_directly() {
        let script = Script::new(&[(true, 2.5)]);
        let plan = UploadPlan::default();
        let mbps = plan.estimate(script.runner(), EventSink::none()).await;
        assert_eq!(mbps, Some(rate(2 * MIB, 2.5)));
        assert_eq!(script.requests(), vec![(2 * MIB, Duration::from_secs(5))]);
    }

    #[tokio::test]
    async fn fast_probe_scales_up_and_reports_scaled_trial() {
        let script = Script::new(&[(true, 0.5), (true, 3.8)]);
        let plan = UploadPlan::default();
        let mbps = plan.estimate(script.runner(), EventSink::none()).await;

        let target = plan.scaled_bytes(rate(2 * MIB, 0.5));
        assert_eq!(mbps, Some(rate(target, 3.8)));
        assert_eq!(
            script.requests(),
            vec![
                (2 * MIB, Duration::from_secs(5)),
                (target, Duration::from_secs(10)),
            ]
        );
    }

    #[tokio::test]
    async fn probe_at_threshold_still_scales_up() {
        let script = Script::new(&[(true, 2.0), (true, 4.0)]);
        let plan = UploadPlan::default();
        plan.estimate(script.runner(), EventSink::none()).await;
        assert_eq!(script.requests().len(), 2);
    }

    #[tokio::test]
    async fn failed_scaled_trial_falls_back_to_probe() {
        let script = Script::new(&[(true, 0.2), (false, 10.0)]);
        let plan = UploadPlan::default();
        let mbps = plan.estimate(script.runner(), EventSink::none()).await;
        assert_eq!(mbps, Some(rate(2 * MIB, 0.2)));
    }

    #[tokio::test]
    async fn very_fast_probe_uses_ceiling() {
        let script = Script::new(&[(true, 0.001), (true, 1.0)]);
        let plan = UploadPlan::default();
        plan.estimate(script.runner(), EventSink::none()).await;
        assert_eq!(script.requests()[1].0, 20 * MIB);
    }

    #[tokio::test]
    async fn trials_are_reported_as_events() {
        let (tx, mut rx) = mpsc::channel(8);
        let script = Script::new(&[(true, 0.5), (false, 10.0)]);
        UploadPlan::default()
            .estimate(script.runner(), EventSink::new(Some(&tx)))
            .await;
        drop(tx);

        let mut stages = Vec::new();
        while let Some(event) = rx.recv().await {
            if let ProbeEvent::UploadTrialFinished { stage, trial } = event {
                stages.push((stage, trial.succeeded));
            }
        }
        assert_eq!(
            stages,
            vec![(UploadStage::Probe, true), (UploadStage::Scaled, false)]
        );
    }

    #[tokio::test]
    async fn concurrent_estimates_do_not_share_trials() {
        let fast = Script::new(&[(true, 0.5), (true, 4.0)]);
        let slow = Script::new(&[(true, 3.0)]);
        let plan = UploadPlan::default();

        let (a, b) = tokio::join!(
            plan.estimate(fast.runner(), EventSink::none()),
            plan.estimate(slow.runner(), EventSink::none()),
        );

        let target = plan.scaled_bytes(rate(2 * MIB, 0.5));
        assert_eq!(a, Some(rate(target, 4.0)));
        assert_eq!(b, Some(rate(2 * MIB, 3.0)));
        assert_eq!(fast.requests().len(), 2);
        assert_eq!(slow.requests().len(), 1);
    }

    #[test]
    fn payload_has_requested_size() {
        assert_eq!(synthesize_payload(2 * MIB).len(), 2 * MIB);
    }
}
