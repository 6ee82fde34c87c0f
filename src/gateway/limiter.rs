use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

use crate::metrics::Recorder;

/// Caps the number of calls executing at once; further callers wait for a slot
#[derive(Clone)]
pub struct AdmissionLimiter {
    permits: Option<Arc<Semaphore>>,
    recorder: Arc<dyn Recorder>,
}

impl AdmissionLimiter {
    /// `capacity <= 0` admits everything
    pub fn new(capacity: i64, recorder: Arc<dyn Recorder>) -> Self {
        let permits = usize::try_from(capacity)
            .ok()
            .filter(|capacity| *capacity > 0)
            .map(|capacity| Arc::new(Semaphore::new(capacity.min(Semaphore::MAX_PERMITS))));

        Self { permits, recorder }
    }

    pub fn is_limited(&self) -> bool {
        self.permits.is_some()
    }

    /// Free slots, `None` when unlimited
    pub fn available(&self) -> Option<usize> {
        self.permits.as_ref().map(|permits| permits.available_permits())
    }

    /// Waits for a slot. The slot is held until the returned guard is dropped.
    pub async fn acquire(&self) -> Admission {
        let permit = match &self.permits {
            Some(permits) => Arc::clone(permits).acquire_owned().await.ok(),
            None => None,
        };

        self.recorder.add_in_flight(1);
        Admission {
            _permit: permit,
            recorder: Arc::clone(&self.recorder),
        }
    }
}

/// Held slot; releases it and the in-flight count on drop
pub struct Admission {
    _permit: Option<OwnedSemaphorePermit>,
    recorder: Arc<dyn Recorder>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.recorder.add_in_flight(-1);
    }
}

/// Middleware admitting requests through the limiter
pub async fn admission(
    State(limiter): State<AdmissionLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let _admission = limiter.acquire().await;
    trace!(available = ?limiter.available(), "Request admitted");
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::noop;
    use std::time::Duration;

    #[test]
    fn test_non_positive_capacity_is_unlimited() {
        assert!(!AdmissionLimiter::new(0, noop()).is_limited());
        assert!(!AdmissionLimiter::new(-5, noop()).is_limited());
        assert_eq!(AdmissionLimiter::new(3, noop()).available(), Some(3));
    }

    #[tokio::test]
    async fn test_third_caller_waits_for_a_slot() {
        let limiter = AdmissionLimiter::new(2, noop());
        let first = limiter.acquire().await;
        let _second = limiter.acquire().await;
        assert_eq!(limiter.available(), Some(0));

        let blocked = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(blocked.is_err());

        drop(first);
        let third = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_unlimited_never_blocks() {
        let limiter = AdmissionLimiter::new(0, noop());
        let mut held = Vec::new();
        for _ in 0..100 {
            held.push(limiter.acquire().await);
        }
        assert_eq!(limiter.available(), None);
    }
}
