//! Event fan-out to subscribers.
//!
//! Sinks are bounded channels and delivery never blocks: a full sink
//! misses the event. General sinks receive every event; a sink bound to a
//! topic filter leaves the general set and receives only publishes whose
//! topic matches its filter.

use crate::packet::{Packet, PacketType};
use crate::topic_matching;

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// A decoded packet tagged with its type. Synthetic events (the
/// disconnect emitted when the transport dies without a DISCONNECT on the
/// wire) carry no packet.
#[derive(Debug, Clone)]
pub struct Event {
    pub packet_type: PacketType,
    pub packet: Option<Packet>,
}

/// Identifies a sink for binding and closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventChannelHandle(u64);

/// The consumer end of a sink.
#[derive(Debug)]
pub struct EventChannel {
    receiver: mpsc::Receiver<Event>,
    handle: EventChannelHandle,
}

impl EventChannel {
    #[must_use]
    pub fn handle(&self) -> EventChannelHandle {
        self.handle
    }

    /// Next event, or `None` once the sink is closed.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug, Clone)]
struct Sink {
    id: u64,
    tx: mpsc::Sender<Event>,
}

impl Sink {
    fn offer(&self, event: &Event) {
        if self.tx.try_send(event.clone()).is_err() {
            tracing::trace!(
                sink = self.id,
                packet_type = ?event.packet_type,
                "event sink full or closed, dropping event"
            );
        }
    }
}

#[derive(Debug, Default)]
struct BusInner {
    next_id: u64,
    // Insertion-ordered; delivery order follows channel creation order.
    general: Vec<Sink>,
    by_filter: HashMap<String, Sink>,
}

/// Sink registry shared by the client operations and the packet pump.
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a new general sink with the given queue capacity.
    pub(crate) fn create_channel(&self, capacity: usize) -> EventChannel {
        let (tx, receiver) = mpsc::channel(capacity.max(1));

        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.general.push(Sink { id, tx });

        EventChannel {
            receiver,
            handle: EventChannelHandle(id),
        }
    }

    /// Removes the sink everywhere. Dropping the last sender closes the
    /// receiver, which is how consumers observe closure.
    pub(crate) fn close_channel(&self, handle: EventChannelHandle) {
        let mut inner = self.inner.lock();
        inner.general.retain(|sink| sink.id != handle.0);
        inner.by_filter.retain(|_, sink| sink.id != handle.0);
    }

    /// Binds a sink to a topic filter, superseding its registration in
    /// the general set. Called when a SUBACK accepts the filter.
    pub(crate) fn bind_filter(&self, filter: &str, handle: EventChannelHandle) {
        let mut inner = self.inner.lock();

        let sink = if let Some(pos) = inner.general.iter().position(|sink| sink.id == handle.0) {
            inner.general.remove(pos)
        } else if let Some(existing) =
            inner.by_filter.values().find(|sink| sink.id == handle.0)
        {
            // Already topic-bound; an additional filter shares the sink.
            existing.clone()
        } else {
            tracing::warn!(filter, "cannot bind unknown event channel to filter");
            return;
        };

        inner.by_filter.insert(filter.to_string(), sink);
    }

    /// Destroys a filter binding (UNSUBACK or explicit close).
    pub(crate) fn unbind_filter(&self, filter: &str) {
        self.inner.lock().by_filter.remove(filter);
    }

    /// Delivers an event to every general sink.
    pub(crate) fn signal(&self, packet_type: PacketType, packet: Option<Packet>) {
        let event = Event {
            packet_type,
            packet,
        };
        for sink in &self.inner.lock().general {
            sink.offer(&event);
        }
    }

    /// Delivers an incoming PUBLISH to every sink whose filter matches
    /// the topic, then to every general sink.
    pub(crate) fn dispatch_publish(&self, topic: &str, packet: Packet) {
        let event = Event {
            packet_type: PacketType::Publish,
            packet: Some(packet),
        };

        let inner = self.inner.lock();
        for (filter, sink) in &inner.by_filter {
            if topic_matching::matches(topic, filter) {
                sink.offer(&event);
            }
        }
        for sink in &inner.general {
            sink.offer(&event);
        }
    }

    #[cfg(test)]
    pub(crate) fn general_count(&self) -> usize {
        self.inner.lock().general.len()
    }
}
