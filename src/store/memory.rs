//! In-memory reference store. Contents do not survive a restart.

use super::{PacketStore, StoreError, StoredPacket};

use parking_lot::Mutex;

/// Order-preserving in-memory store: a guarded `Vec`, scanned linearly.
/// The identifier space is 16-bit and entry counts track the in-flight
/// windows, so the scan stays small.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<(u16, StoredPacket)>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl PacketStore for MemoryStore {
    fn insert(&self, id: u16, packet: StoredPacket) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        if entries.iter().any(|(existing, _)| *existing == id) {
            return Err(StoreError::DuplicateEntry(id));
        }
        entries.push((id, packet));
        Ok(())
    }

    fn get(&self, id: u16) -> Result<StoredPacket, StoreError> {
        self.entries
            .lock()
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, packet)| packet.clone())
            .ok_or(StoreError::NoEntry(id))
    }

    fn remove(&self, id: u16) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        let position = entries
            .iter()
            .position(|(existing, _)| *existing == id)
            .ok_or(StoreError::NoEntry(id))?;
        entries.remove(position);
        Ok(())
    }

    fn entries(&self) -> Vec<(u16, StoredPacket)> {
        self.entries.lock().clone()
    }
}
