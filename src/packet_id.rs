//! Packet-identifier allocation.
//!
//! Identifiers come from a caller-supplied random source (the low 16 bits
//! of each draw), are never zero, and stay reserved from allocation until
//! the flow's terminal acknowledgement releases them. A draw that collides
//! with an in-use identifier is retried.

use crate::error::{MqttError, Result};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::HashSet;

pub struct PacketIdAllocator {
    rng: Mutex<Box<dyn RngCore + Send>>,
    in_use: Mutex<HashSet<u16>>,
}

impl PacketIdAllocator {
    /// Uses a process-entropy-seeded pseudo-random source.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    #[must_use]
    pub fn with_rng(rng: impl RngCore + Send + 'static) -> Self {
        Self {
            rng: Mutex::new(Box::new(rng)),
            in_use: Mutex::new(HashSet::new()),
        }
    }

    /// Draws a fresh non-zero identifier and marks it in use.
    pub fn allocate(&self) -> Result<u16> {
        let mut in_use = self.in_use.lock();
        if in_use.len() >= usize::from(u16::MAX) {
            return Err(MqttError::PacketIdExhausted);
        }

        let mut rng = self.rng.lock();
        loop {
            #[allow(clippy::cast_possible_truncation)]
            let id = rng.next_u32() as u16;
            if id != 0 && in_use.insert(id) {
                return Ok(id);
            }
        }
    }

    /// Reserves a caller-chosen identifier, e.g. when replaying a
    /// persisted publish with its stored identifier.
    pub fn claim(&self, id: u16) -> Result<()> {
        if id == 0 {
            return Err(MqttError::InvalidArgument(
                "packet identifier must be non-zero".to_string(),
            ));
        }
        if self.in_use.lock().insert(id) {
            Ok(())
        } else {
            Err(MqttError::PacketIdInUse(id))
        }
    }

    pub fn release(&self, id: u16) {
        self.in_use.lock().remove(&id);
    }

    #[must_use]
    pub fn is_in_use(&self, id: u16) -> bool {
        self.in_use.lock().contains(&id)
    }

    pub fn clear(&self) {
        self.in_use.lock().clear();
    }
}

impl Default for PacketIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
