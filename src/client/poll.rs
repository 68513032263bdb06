//! The incoming-packet pump.
//!
//! Each call reads at most one packet: the first header byte under the
//! caller's deadline (expiry there is no-progress, not an error), the
//! rest of the packet under the extended body deadline, then dispatches.

use crate::error::{MqttError, Result};
use crate::packet::ack::{PubCompPacket, PubRecPacket};
use crate::packet::{DisconnectPacket, Packet, PacketType, PublishPacket};
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::store::{StoreError, StoredPacket};
use crate::time::Deadline;
use crate::types::QoS;

use super::Client;

use tokio::time::Duration;

impl Client {
    /// Single-shot pump: reads and processes one incoming packet.
    /// Returns without progress when the deadline expires before a
    /// packet starts. Must run on a different task from a `publish` that
    /// may block on send quota, since that quota is released from here.
    pub async fn poll(&self, deadline: Deadline) -> Result<()> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }

        if self.state.lock().ping_deadline_passed() {
            tracing::error!("no PINGRESP within the ping-response deadline");
            self.shutdown_session(None, None, &deadline).await;
            return Err(MqttError::KeepAliveTimeout);
        }

        let read_result = {
            let mut reader = self.reader.lock().await;
            let body_deadline = Deadline::after(self.body_read_timeout);
            reader.poll_packet(&deadline, &body_deadline).await
        };

        let packet = match read_result {
            Ok(Some(packet)) => packet,
            Ok(None) => return Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "read failed, closing session");
                self.shutdown_session(None, None, &deadline).await;
                return Err(e);
            }
        };

        tracing::trace!(packet_type = ?packet.packet_type(), "packet received");
        self.dispatch(packet, &deadline).await
    }

    async fn dispatch(&self, packet: Packet, deadline: &Deadline) -> Result<()> {
        match packet {
            Packet::Publish(publish) => self.handle_publish(publish, deadline).await,
            Packet::PubAck(ack) => {
                self.finish_outbound_flow(ack.packet_id, QoS::AtLeastOnce)?;
                self.signal_event(PacketType::PubAck, Some(Packet::PubAck(ack)));
                Ok(())
            }
            Packet::PubRec(rec) => self.handle_pubrec(rec, deadline).await,
            Packet::PubComp(comp) => {
                self.finish_outbound_flow(comp.packet_id, QoS::ExactlyOnce)?;
                self.signal_event(PacketType::PubComp, Some(Packet::PubComp(comp)));
                Ok(())
            }
            Packet::PubRel(rel) => self.handle_pubrel(rel, deadline).await,
            Packet::SubAck(suback) => {
                let packet_id = suback.packet_id;
                if let Some(unclaimed) = self.complete_pending(packet_id, Packet::SubAck(suback)) {
                    tracing::warn!(packet_id, "SUBACK without a pending subscribe");
                    self.signal_event(PacketType::SubAck, Some(unclaimed));
                }
                Ok(())
            }
            Packet::UnsubAck(unsuback) => {
                let packet_id = unsuback.packet_id;
                if let Some(unclaimed) =
                    self.complete_pending(packet_id, Packet::UnsubAck(unsuback))
                {
                    tracing::warn!(packet_id, "UNSUBACK without a pending unsubscribe");
                    self.signal_event(PacketType::UnsubAck, Some(unclaimed));
                }
                Ok(())
            }
            Packet::PingResp => {
                tracing::trace!("PINGRESP received");
                self.state.lock().arm_ping_deadline();
                self.signal_event(PacketType::PingResp, Some(Packet::PingResp));
                Ok(())
            }
            Packet::Disconnect(disconnect) => {
                tracing::debug!(reason = %disconnect.reason_code, "server DISCONNECT");
                self.shutdown_session(None, Some(Packet::Disconnect(disconnect)), deadline)
                    .await;
                Ok(())
            }
            Packet::Auth(auth) => {
                // Enhanced auth is pass-through: surface it to the host.
                self.signal_event(PacketType::Auth, Some(Packet::Auth(auth)));
                Ok(())
            }
            // Client-to-server packets have no business arriving here.
            other @ (Packet::Connect(_)
            | Packet::ConnAck(_)
            | Packet::Subscribe(_)
            | Packet::Unsubscribe(_)
            | Packet::PingReq) => {
                let packet_type = other.packet_type();
                tracing::error!(?packet_type, "unexpected packet type, closing session");
                self.shutdown_session(None, None, deadline).await;
                Err(MqttError::UnexpectedPacket(packet_type))
            }
        }
    }

    /// The receive path of an incoming PUBLISH: quota, fan-out, ack.
    async fn handle_publish(&self, publish: PublishPacket, deadline: &Deadline) -> Result<()> {
        let topic = publish.topic.clone();

        match publish.qos {
            QoS::AtMostOnce => {
                self.events.dispatch_publish(&topic, Packet::Publish(publish));
                Ok(())
            }
            QoS::AtLeastOnce => {
                let packet_id = require_packet_id(&publish)?;
                if !self.state.lock().take_receive_quota() {
                    return self.receive_overflow(deadline).await;
                }

                self.events.dispatch_publish(&topic, Packet::Publish(publish));

                self.write_packet_or_close(
                    &Packet::PubAck(crate::packet::PubAckPacket::new(packet_id)),
                    deadline,
                )
                .await?;
                self.state.lock().restore_receive_quota();
                Ok(())
            }
            QoS::ExactlyOnce => {
                let packet_id = require_packet_id(&publish)?;

                // A redelivery of a publish we already hold is re-acked
                // without dispatching or touching the quota.
                if self.state.lock().inbound_unreleased.contains(&packet_id) {
                    tracing::debug!(packet_id, "re-acking unreleased QoS 2 publish");
                    return self
                        .write_packet_or_close(
                            &Packet::PubRec(PubRecPacket::new(packet_id)),
                            deadline,
                        )
                        .await;
                }

                if !self.state.lock().take_receive_quota() {
                    return self.receive_overflow(deadline).await;
                }

                self.events.dispatch_publish(&topic, Packet::Publish(publish));

                self.write_packet_or_close(
                    &Packet::PubRec(PubRecPacket::new(packet_id)),
                    deadline,
                )
                .await?;

                self.state.lock().inbound_unreleased.insert(packet_id);
                if let Some(store) = &self.store {
                    store.insert(packet_id, StoredPacket::PubRec(PubRecPacket::new(packet_id)))?;
                }
                Ok(())
            }
        }
    }

    /// PUBREC for one of our QoS 2 publishes: swap the persisted PUBLISH
    /// for a PUBREC record and release, or abort the flow on an error
    /// reason.
    async fn handle_pubrec(&self, rec: PubRecPacket, deadline: &Deadline) -> Result<()> {
        let packet_id = rec.packet_id;
        let in_flight = self
            .state
            .lock()
            .outbound_in_flight
            .get(&packet_id)
            .copied();

        if in_flight != Some(QoS::ExactlyOnce) {
            tracing::warn!(packet_id, "PUBREC without a matching QoS 2 publish");
            self.signal_event(PacketType::PubRec, Some(Packet::PubRec(rec)));
            return Ok(());
        }

        if rec.reason_code.is_error() {
            // The server refused the message; the flow ends here and the
            // quota slot frees.
            tracing::warn!(packet_id, reason = %rec.reason_code, "QoS 2 publish refused");
            self.finish_outbound_flow(packet_id, QoS::ExactlyOnce)?;
            self.signal_event(PacketType::PubRec, Some(Packet::PubRec(rec)));
            return Ok(());
        }

        if let Some(store) = &self.store {
            store.remove(packet_id)?;
            store.insert(packet_id, StoredPacket::PubRec(rec.clone()))?;
        }

        self.write_packet_or_close(
            &Packet::PubRel(crate::packet::PubRelPacket::new(packet_id)),
            deadline,
        )
        .await?;

        self.signal_event(PacketType::PubRec, Some(Packet::PubRec(rec)));
        Ok(())
    }

    /// PUBREL for an inbound QoS 2 flow: drop the PUBREC record, complete
    /// with PUBCOMP, restore the receive quota.
    async fn handle_pubrel(
        &self,
        rel: crate::packet::PubRelPacket,
        deadline: &Deadline,
    ) -> Result<()> {
        let packet_id = rel.packet_id;
        let released = self.state.lock().inbound_unreleased.remove(&packet_id);

        let reason = if released {
            if let Some(store) = &self.store {
                match store.remove(packet_id) {
                    Ok(()) | Err(StoreError::NoEntry(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            ReasonCode::Success
        } else {
            ReasonCode::PacketIdentifierNotFound
        };

        self.write_packet_or_close(
            &Packet::PubComp(PubCompPacket::new_with_reason(packet_id, reason)),
            deadline,
        )
        .await?;

        if released {
            self.state.lock().restore_receive_quota();
        }

        self.signal_event(PacketType::PubRel, Some(Packet::PubRel(rel)));
        Ok(())
    }

    /// Terminal ack of an outbound QoS>0 flow: drops the in-flight
    /// entry, the persisted entry, and the identifier, and restores the
    /// send quota exactly once.
    fn finish_outbound_flow(&self, packet_id: u16, expected_qos: QoS) -> Result<()> {
        let removed = self.state.lock().outbound_in_flight.remove(&packet_id);

        match removed {
            Some(qos) => {
                if qos != expected_qos {
                    tracing::warn!(
                        packet_id,
                        ?qos,
                        ?expected_qos,
                        "acknowledgement kind does not match the in-flight QoS"
                    );
                }

                if let Some(store) = &self.store {
                    match store.remove(packet_id) {
                        Ok(()) | Err(StoreError::NoEntry(_)) => {}
                        Err(e) => return Err(e.into()),
                    }
                }

                if let Some(quota) = self.send_quota.lock().as_ref() {
                    quota.release();
                }
                self.packet_ids.release(packet_id);
                Ok(())
            }
            None => {
                tracing::warn!(packet_id, "acknowledgement for an unknown packet identifier");
                Ok(())
            }
        }
    }

    /// A QoS>0 publish arrived with the receive quota exhausted: the
    /// session must end with reason 0x93.
    async fn receive_overflow(&self, deadline: &Deadline) -> Result<()> {
        tracing::error!("receive maximum exceeded, disconnecting");
        let disconnect = DisconnectPacket::new(ReasonCode::ReceiveMaximumExceeded);
        let event = Packet::Disconnect(disconnect.clone());
        let write_deadline = deadline.min_timeout(Duration::from_secs(1));
        self.shutdown_session(Some(disconnect), Some(event), &write_deadline)
            .await;
        Err(MqttError::ReceiveMaximumExceeded)
    }
}

fn require_packet_id(publish: &PublishPacket) -> Result<u16> {
    publish.packet_id.ok_or_else(|| {
        MqttError::MalformedPacket("QoS>0 PUBLISH without packet identifier".to_string())
    })
}
