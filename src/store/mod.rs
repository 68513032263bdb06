//! Persistence for unacknowledged QoS flows.
//!
//! Entries are keyed by packet identifier and live exactly as long as the
//! flow needs them: a QoS 1 PUBLISH from send to PUBACK, an outbound
//! QoS 2 PUBLISH from send to PUBREC (then a PUBREC record until
//! PUBCOMP), an inbound QoS 2 flow as a PUBREC record until PUBREL.
//! Insertion order is preserved so a reconnecting host can replay in the
//! original send order.

pub mod memory;

use crate::packet::{PubRecPacket, PublishPacket};

use thiserror::Error;

pub use memory::MemoryStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("duplicate entry for packet identifier {0}")]
    DuplicateEntry(u16),

    #[error("no entry for packet identifier {0}")]
    NoEntry(u16),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// A persisted flow record.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredPacket {
    Publish(PublishPacket),
    PubRec(PubRecPacket),
}

/// The persistence interface consumed by the client core. Implementations
/// must preserve insertion order for `entries`; durability is up to the
/// backend. The core surfaces every store failure to the caller and never
/// retries.
pub trait PacketStore: Send + Sync {
    /// Stores an entry. Duplicate identifiers are rejected.
    fn insert(&self, id: u16, packet: StoredPacket) -> Result<(), StoreError>;

    fn get(&self, id: u16) -> Result<StoredPacket, StoreError>;

    fn remove(&self, id: u16) -> Result<(), StoreError>;

    /// Snapshot of all entries in insertion order.
    fn entries(&self) -> Vec<(u16, StoredPacket)>;
}
