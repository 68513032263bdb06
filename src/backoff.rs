//! Retry discipline for blocking handshake reads.
//!
//! A clean EOF while waiting for a CONNACK (or any other directly awaited
//! reply) is treated as transient: the peer has not produced the packet
//! yet. The read is retried after an exponentially growing delay with
//! random jitter, bounded by the caller's deadline.

use crate::error::{MqttError, Result};
use crate::time::Deadline;

use rand::Rng;
use std::future::Future;
use tokio::time::Duration;

const INITIAL_DELAY_MS: u64 = 10;
const JITTER_MS: u64 = 1000;

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// deadline passes. Delay before retry `n` is `10ms * 2^n` plus 0-999ms of
/// jitter.
pub async fn retry<F, Fut, T>(deadline: Deadline, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut exponent = 0u32;
    loop {
        if deadline.is_expired() {
            return Err(MqttError::Timeout);
        }

        match deadline.bound(op()).await {
            Err(e) if e.is_transient_eof() => {
                let delay = INITIAL_DELAY_MS.saturating_mul(1u64 << exponent.min(20))
                    + rand::thread_rng().gen_range(0..JITTER_MS);
                exponent += 1;
                tracing::trace!(delay_ms = delay, "transient EOF, backing off");
                deadline
                    .bound(async {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        Ok(())
                    })
                    .await?;
            }
            other => return other,
        }
    }
}
