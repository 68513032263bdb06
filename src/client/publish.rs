//! The publish send path.

use crate::error::{MqttError, Result};
use crate::packet::{Packet, PublishPacket};
use crate::store::{StoreError, StoredPacket};
use crate::time::Deadline;
use crate::types::QoS;
use crate::validation;

use super::Client;

impl Client {
    /// Publishes a message.
    ///
    /// QoS 0 goes straight to the wire. QoS>0 allocates a packet
    /// identifier when the packet carries none, persists the packet
    /// before the network write when a store is configured, and blocks
    /// (FIFO, deadline-bounded) while the send quota is exhausted. A
    /// write failure leaves the persisted entry in place for replay.
    ///
    /// Hosts replaying persisted entries after a reconnect pass the
    /// stored packet with its identifier and the duplicate flag set.
    pub async fn publish(&self, deadline: Deadline, mut packet: PublishPacket) -> Result<()> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }
        if !validation::is_valid_topic_name(&packet.topic) {
            return Err(MqttError::InvalidTopicName(packet.topic));
        }

        if packet.qos == QoS::AtMostOnce {
            if packet.packet_id.is_some() {
                return Err(MqttError::InvalidArgument(
                    "QoS 0 publish must not carry a packet identifier".to_string(),
                ));
            }
            return self
                .write_packet_or_close(&Packet::Publish(packet), &deadline)
                .await;
        }

        let packet_id = self.reserve_publish_id(&mut packet)?;

        // Persist before the wire write so the flow survives a crash
        // between the two.
        if let Some(store) = &self.store {
            match store.insert(packet_id, StoredPacket::Publish(packet.clone())) {
                Ok(()) => {}
                // A replayed publish is already persisted.
                Err(StoreError::DuplicateEntry(_)) if packet.dup => {}
                Err(e) => return Err(e.into()),
            }
        }

        let quota = self
            .send_quota
            .lock()
            .clone()
            .ok_or(MqttError::NotConnected)?;
        let slot = quota.acquire(&deadline).await?;

        self.write_packet_or_close(&Packet::Publish(packet.clone()), &deadline)
            .await?;

        // The send is committed: the quota slot stays taken until the
        // terminal ack, and the in-flight entry guarantees it is
        // restored exactly once.
        self.state
            .lock()
            .outbound_in_flight
            .insert(packet_id, packet.qos);
        slot.commit();

        tracing::debug!(
            topic = %packet.topic,
            packet_id,
            qos = ?packet.qos,
            dup = packet.dup,
            "PUBLISH sent"
        );
        Ok(())
    }

    /// Allocates or re-claims the packet identifier for a QoS>0 publish.
    /// A caller-supplied identifier that is already reserved is accepted:
    /// retries after a cancelled attempt and replays of persisted entries
    /// reuse their identifier.
    fn reserve_publish_id(&self, packet: &mut PublishPacket) -> Result<u16> {
        match packet.packet_id {
            Some(id) => match self.packet_ids.claim(id) {
                Ok(()) | Err(MqttError::PacketIdInUse(_)) => Ok(id),
                Err(e) => Err(e),
            },
            None => {
                let id = self.packet_ids.allocate()?;
                packet.packet_id = Some(id);
                Ok(id)
            }
        }
    }
}
