use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::protocol::v5::reason_codes::ReasonCode;

use bytes::{Buf, BufMut};

fn is_valid_unsuback_reason_code(code: ReasonCode) -> bool {
    matches!(
        code,
        ReasonCode::Success
            | ReasonCode::NoSubscriptionExisted
            | ReasonCode::UnspecifiedError
            | ReasonCode::ImplementationSpecificError
            | ReasonCode::NotAuthorized
            | ReasonCode::TopicFilterInvalid
            | ReasonCode::PacketIdentifierInUse
    )
}

/// Unsubscribe acknowledgement: one reason code per requested filter.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsubAckPacket {
    pub packet_id: u16,
    pub reason_codes: Vec<ReasonCode>,
    pub properties: Properties,
}

impl UnsubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16, reason_codes: Vec<ReasonCode>) -> Self {
        Self {
            packet_id,
            reason_codes,
            properties: Properties::default(),
        }
    }
}

impl MqttPacket for UnsubAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::UnsubAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u16(self.packet_id);
        self.properties.encode(buf)?;
        for code in &self.reason_codes {
            buf.put_u8((*code).into());
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "UNSUBACK missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        let properties = Properties::decode(buf)?;

        let mut reason_codes = Vec::new();
        while buf.has_remaining() {
            let byte = buf.get_u8();
            let code = ReasonCode::from_u8(byte)
                .filter(|code| is_valid_unsuback_reason_code(*code))
                .ok_or_else(|| {
                    MqttError::MalformedPacket(format!(
                        "Invalid UNSUBACK reason code: 0x{byte:02X}"
                    ))
                })?;
            reason_codes.push(code);
        }

        if reason_codes.is_empty() {
            return Err(MqttError::MalformedPacket(
                "UNSUBACK must contain at least one reason code".to_string(),
            ));
        }

        Ok(Self {
            packet_id,
            reason_codes,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_unsuback_round_trip() {
        let packet = UnsubAckPacket::new(
            8,
            vec![ReasonCode::Success, ReasonCode::NoSubscriptionExisted],
        );

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = UnsubAckPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_invalid_reason_code_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16(1);
        buf.put_u8(0);
        buf.put_u8(0x01); // granted QoS 1: a SUBACK code, not UNSUBACK

        let fixed_header = FixedHeader::new(PacketType::UnsubAck, 0, 4);
        assert!(UnsubAckPacket::decode_body(&mut buf, &fixed_header).is_err());
    }
}
