//! Operation deadlines.
//!
//! Every client operation accepts a [`Deadline`]; transport reads and
//! writes performed on behalf of that operation are bounded by it. An
//! empty deadline lets I/O block indefinitely.

use crate::error::{MqttError, Result};

use std::future::Future;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline; operations may block indefinitely.
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    #[must_use]
    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    #[must_use]
    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    /// The earlier of this deadline and `timeout` from now.
    #[must_use]
    pub fn min_timeout(&self, timeout: Duration) -> Self {
        let capped = Instant::now() + timeout;
        Self(Some(self.0.map_or(capped, |at| at.min(capped))))
    }

    /// Runs `fut` bounded by this deadline, mapping expiry to
    /// [`MqttError::Timeout`].
    pub async fn bound<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.0 {
            None => fut.await,
            Some(at) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| MqttError::Timeout)?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_none_never_expires() {
        let deadline = Deadline::none();
        assert!(!deadline.is_expired());
        assert!(deadline.instant().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_expires() {
        let deadline = Deadline::after(Duration::from_millis(50));
        assert!(!deadline.is_expired());
        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(deadline.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bound_times_out() {
        let deadline = Deadline::after(Duration::from_millis(10));
        let result = deadline
            .bound(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(MqttError::Timeout)));
    }

    #[tokio::test]
    async fn test_bound_passes_through() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let result = deadline.bound(async { Ok(7u32) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_min_timeout_keeps_earlier_deadline() {
        let near = Instant::now() + Duration::from_millis(5);
        let deadline = Deadline::at(near).min_timeout(Duration::from_secs(30));
        assert_eq!(deadline.instant(), Some(near));

        let far = Deadline::none().min_timeout(Duration::from_secs(30));
        assert!(far.instant().is_some());
    }
}
