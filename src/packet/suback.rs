use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::types::QoS;

use bytes::{Buf, BufMut};

fn is_valid_suback_reason_code(code: ReasonCode) -> bool {
    matches!(
        code,
        ReasonCode::Success
            | ReasonCode::GrantedQoS1
            | ReasonCode::GrantedQoS2
            | ReasonCode::UnspecifiedError
            | ReasonCode::ImplementationSpecificError
            | ReasonCode::NotAuthorized
            | ReasonCode::TopicFilterInvalid
            | ReasonCode::PacketIdentifierInUse
            | ReasonCode::QuotaExceeded
            | ReasonCode::SharedSubscriptionsNotSupported
            | ReasonCode::SubscriptionIdentifiersNotSupported
            | ReasonCode::WildcardSubscriptionsNotSupported
    )
}

/// Subscribe acknowledgement: one reason code per requested filter, in
/// request order.
#[derive(Debug, Clone, PartialEq)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub reason_codes: Vec<ReasonCode>,
    pub properties: Properties,
}

impl SubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16, reason_codes: Vec<ReasonCode>) -> Self {
        Self {
            packet_id,
            reason_codes,
            properties: Properties::default(),
        }
    }

    /// The QoS granted by a per-filter code, or `None` for a refusal.
    #[must_use]
    pub fn granted_qos(code: ReasonCode) -> Option<QoS> {
        match code {
            ReasonCode::Success => Some(QoS::AtMostOnce),
            ReasonCode::GrantedQoS1 => Some(QoS::AtLeastOnce),
            ReasonCode::GrantedQoS2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

impl MqttPacket for SubAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::SubAck
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
                "SUBACK missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        let properties = Properties::decode(buf)?;

        let mut reason_codes = Vec::new();
        while buf.has_remaining() {
            let byte = buf.get_u8();
            let code = ReasonCode::from_u8(byte)
                .filter(|code| is_valid_suback_reason_code(*code))
                .ok_or_else(|| {
                    MqttError::MalformedPacket(format!("Invalid SUBACK reason code: 0x{byte:02X}"))
                })?;
            reason_codes.push(code);
        }

        if reason_codes.is_empty() {
            return Err(MqttError::MalformedPacket(
                "SUBACK must contain at least one reason code".to_string(),
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
    fn test_suback_round_trip() {
        let packet = SubAckPacket::new(
            321,
            vec![
                ReasonCode::Success,
                ReasonCode::GrantedQoS1,
                ReasonCode::NotAuthorized,
            ],
        );

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = SubAckPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_granted_qos_mapping() {
        assert_eq!(
            SubAckPacket::granted_qos(ReasonCode::Success),
            Some(QoS::AtMostOnce)
        );
        assert_eq!(
            SubAckPacket::granted_qos(ReasonCode::GrantedQoS2),
            Some(QoS::ExactlyOnce)
        );
        assert_eq!(SubAckPacket::granted_qos(ReasonCode::QuotaExceeded), None);
    }

    #[test]
    fn test_empty_reason_codes_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16(1);
        buf.put_u8(0);

        let fixed_header = FixedHeader::new(PacketType::SubAck, 0, 3);
        assert!(SubAckPacket::decode_body(&mut buf, &fixed_header).is_err());
    }

    #[test]
    fn test_invalid_reason_code_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16(1);
        buf.put_u8(0);
        buf.put_u8(0x92); // packet identifier not found: not a SUBACK code

        let fixed_header = FixedHeader::new(PacketType::SubAck, 0, 4);
        assert!(SubAckPacket::decode_body(&mut buf, &fixed_header).is_err());
    }
}
