use crate::error::PhaseError;
use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Scoped cancellation context for one network operation.
///
/// Anything run through [`Deadline::run`] is dropped as soon as the deadline
/// passes or the token fires, which tears down the underlying request.
#[derive(Debug)]
pub(crate) struct Deadline {
    limit: Duration,
    expires_at: Instant,
    token: CancellationToken,
}

impl Deadline {
    /// Starts the clock now. Cancelling `parent` cancels this deadline too.
    pub fn new(limit: Duration, parent: &CancellationToken) -> Self {
        Self {
            limit,
            expires_at: Instant::now() + limit,
            token: parent.child_token(),
        }
    }

    pub async fn run<F>(&self, fut: F) -> Result<F::Output, PhaseError>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(PhaseError::Cancelled),
            _ = time::sleep_until(self.expires_at) => Err(PhaseError::DeadlineExceeded(self.limit)),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future;

    #[tokio::test(start_paused = true)]
    async fn ready_future_completes() {
        let deadline = Deadline::new(Duration::from_secs(1), &CancellationToken::new());
        assert_eq!(deadline.run(async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_future_hits_deadline() {
        let deadline = Deadline::new(Duration::from_millis(500), &CancellationToken::new());
        let start = Instant::now();
        let err = deadline.run(future::pending::<()>()).await.unwrap_err();
        assert!(matches!(err, PhaseError::DeadlineExceeded(d) if d == Duration::from_millis(500)));
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(start.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_absolute_across_calls() {
        let deadline = Deadline::new(Duration::from_secs(1), &CancellationToken::new());
        deadline.run(time::sleep(Duration::from_millis(700))).await.unwrap();
        let err = deadline
            .run(time::sleep(Duration::from_millis(700)))
            .await
            .unwrap_err();
        assert!(matches!(err, PhaseError::DeadlineExceeded(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_propagates() {
        let parent = CancellationToken::new();
        let deadline = Deadline::new(Duration::from_secs(60), &parent);
        parent.cancel();
        let err = deadline.run(future::pending::<()>()).await.unwrap_err();
        assert!(matches!(err, PhaseError::Cancelled));
    }
}
