//! Send-quota enforcement.
//!
//! The quota starts at the server's receive maximum, is taken before each
//! QoS>0 PUBLISH hits the wire, and is given back by the matching PUBACK,
//! PUBCOMP, or error PUBREC. The semaphore is fair: publishers blocked on
//! an exhausted quota wake in FIFO order, one per freed slot.

use crate::error::{MqttError, Result};
use crate::time::Deadline;

use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub(crate) struct SendQuota {
    semaphore: Arc<Semaphore>,
    maximum: u16,
}

/// A taken quota slot. Dropping it returns the slot (a publish that never
/// reached the wire); `commit` keeps it taken until the ack path calls
/// `SendQuota::release`.
pub(crate) struct QuotaSlot<'a> {
    quota: &'a SendQuota,
    committed: bool,
}

impl QuotaSlot<'_> {
    pub(crate) fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for QuotaSlot<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.quota.semaphore.add_permits(1);
        }
    }
}

impl SendQuota {
    pub(crate) fn new(maximum: u16) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(usize::from(maximum))),
            maximum,
        }
    }

    /// Blocks until a quota slot frees, bounded by the deadline.
    pub(crate) async fn acquire(&self, deadline: &Deadline) -> Result<QuotaSlot<'_>> {
        let permit = deadline
            .bound(async {
                self.semaphore
                    .acquire()
                    .await
                    .map_err(|_| MqttError::NotConnected)
            })
            .await?;
        permit.forget();
        Ok(QuotaSlot {
            quota: self,
            committed: false,
        })
    }

    /// Returns one slot. Callers gate this on the outbound in-flight map
    /// so each send is restored exactly once and the count never exceeds
    /// the maximum.
    pub(crate) fn release(&self) {
        self.semaphore.add_permits(1);
    }

    #[must_use]
    pub(crate) fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    #[must_use]
    pub(crate) fn maximum(&self) -> u16 {
        self.maximum
    }
}
