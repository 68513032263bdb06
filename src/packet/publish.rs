use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::types::QoS;

use bytes::{Buf, BufMut, Bytes};

const FLAG_RETAIN: u8 = 0x01;
const FLAG_DUP: u8 = 0x08;

/// Application message. The fixed-header flag nibble carries retain
/// (bit 0), QoS (bits 1-2), and the duplicate flag (bit 3); the packet
/// identifier is present exactly when QoS > 0.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishPacket {
    pub topic: String,
    pub packet_id: Option<u16>,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    pub properties: Properties,
}

impl PublishPacket {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            packet_id: None,
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
            dup: false,
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub fn with_packet_id(mut self, packet_id: u16) -> Self {
        self.packet_id = Some(packet_id);
        self
    }

    /// Marks a replayed message; set by hosts re-publishing persisted
    /// entries after a reconnect.
    #[must_use]
    pub fn with_dup(mut self, dup: bool) -> Self {
        self.dup = dup;
        self
    }
}

impl MqttPacket for PublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish
    }

    fn flags(&self) -> u8 {
        let mut flags = (self.qos as u8) << 1;
        if self.retain {
            flags |= FLAG_RETAIN;
        }
        if self.dup {
            flags |= FLAG_DUP;
        }
        flags
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.topic.is_empty() {
            return Err(MqttError::MalformedPacket(
                "PUBLISH topic name must not be empty".to_string(),
            ));
        }

        encode_string(buf, &self.topic)?;

        if self.qos > QoS::AtMostOnce {
            let packet_id = self.packet_id.ok_or_else(|| {
                MqttError::MalformedPacket(
                    "QoS>0 PUBLISH requires a packet identifier".to_string(),
                )
            })?;
            buf.put_u16(packet_id);
        } else if self.packet_id.is_some() {
            return Err(MqttError::MalformedPacket(
                "QoS 0 PUBLISH must not carry a packet identifier".to_string(),
            ));
        }

        self.properties.encode(buf)?;
        buf.put_slice(&self.payload);
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        let flags = fixed_header.flags;
        let qos_bits = (flags >> 1) & 0x03;
        let qos = QoS::try_from(qos_bits).map_err(|_| {
            MqttError::MalformedPacket("PUBLISH QoS bits must not be 3".to_string())
        })?;

        let start = buf.remaining();
        let topic = decode_string(buf)?;

        let packet_id = if qos > QoS::AtMostOnce {
            if buf.remaining() < 2 {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH truncated before packet identifier".to_string(),
                ));
            }
            let id = buf.get_u16();
            if id == 0 {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH packet identifier must be non-zero".to_string(),
                ));
            }
            Some(id)
        } else {
            None
        };

        let properties = Properties::decode(buf)?;

        // Payload is whatever the remaining length has not yet accounted
        // for.
        let consumed = start - buf.remaining();
        let payload_len = (fixed_header.remaining_length as usize)
            .checked_sub(consumed)
            .ok_or_else(|| {
                MqttError::MalformedPacket(
                    "PUBLISH variable header exceeds remaining length".to_string(),
                )
            })?;
        if buf.remaining() < payload_len {
            return Err(MqttError::MalformedPacket(format!(
                "PUBLISH payload claims {payload_len} bytes but only {} remain",
                buf.remaining()
            )));
        }
        let payload = buf.copy_to_bytes(payload_len);

        Ok(Self {
            topic,
            packet_id,
            payload,
            qos,
            retain: flags & FLAG_RETAIN != 0,
            dup: flags & FLAG_DUP != 0,
            properties,
        })
    }
}
