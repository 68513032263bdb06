use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::protocol::v5::reason_codes::ReasonCode;

use bytes::{Buf, BufMut};

/// Connection acknowledgement. The recognized properties are session
/// expiry, receive maximum, maximum QoS, retain available, maximum packet
/// size, assigned client identifier, topic alias maximum, reason string,
/// user properties, wildcard/subscription-identifier/shared-subscription
/// availability, server keep alive, response information, server
/// reference, and the authentication method/data pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnAckPacket {
    pub session_present: bool,
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl ConnAckPacket {
    #[must_use]
    pub fn new(reason_code: ReasonCode) -> Self {
        Self {
            session_present: false,
            reason_code,
            properties: Properties::default(),
        }
    }

    /// Server keep-alive override, when present.
    #[must_use]
    pub fn server_keep_alive(&self) -> Option<u16> {
        self.properties.get_server_keep_alive()
    }

    /// Server-advertised receive maximum; 65 535 when absent.
    #[must_use]
    pub fn receive_maximum(&self) -> u16 {
        self.properties.get_receive_maximum().unwrap_or(u16::MAX)
    }
}

impl MqttPacket for ConnAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::ConnAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(u8::from(self.session_present));
        buf.put_u8(self.reason_code.into());
        self.properties.encode(buf)
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "CONNACK truncated before reason code".to_string(),
            ));
        }

        let ack_flags = buf.get_u8();
        if ack_flags & 0xFE != 0 {
            return Err(MqttError::MalformedPacket(format!(
                "CONNACK reserved acknowledge flags set: 0x{ack_flags:02X}"
            )));
        }

        let code_byte = buf.get_u8();
        let reason_code = ReasonCode::from_u8(code_byte)
            .ok_or(MqttError::InvalidReasonCode(code_byte))?;

        let properties = Properties::decode(buf)?;

        Ok(Self {
            session_present: ack_flags & 0x01 != 0,
            reason_code,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::v5::properties::{PropertyId, PropertyValue};
    use bytes::BytesMut;

    #[test]
    fn test_connack_round_trip() {
        let mut packet = ConnAckPacket::new(ReasonCode::Success);
        packet.session_present = true;
        packet
            .properties
            .add(PropertyId::ServerKeepAlive, PropertyValue::TwoByteInteger(30))
            .unwrap();
        packet.properties.set_receive_maximum(10);
        packet
            .properties
            .add(
                PropertyId::AssignedClientIdentifier,
                PropertyValue::Utf8String("auto-17".to_string()),
            )
            .unwrap();

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = ConnAckPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert_eq!(decoded, packet);
        assert!(decoded.session_present);
        assert_eq!(decoded.server_keep_alive(), Some(30));
        assert_eq!(decoded.receive_maximum(), 10);
        assert_eq!(
            decoded.properties.get_assigned_client_identifier(),
            Some("auto-17")
        );
    }

    #[test]
    fn test_receive_maximum_defaults_to_65535() {
        let packet = ConnAckPacket::new(ReasonCode::Success);
        assert_eq!(packet.receive_maximum(), 65_535);
    }

    #[test]
    fn test_error_reason_code() {
        let packet = ConnAckPacket::new(ReasonCode::NotAuthorized);
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = ConnAckPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert!(decoded.reason_code.is_error());
    }

    #[test]
    fn test_reserved_ack_flags_rejected() {
        let mut buf = BytesMut::from(&[0x02, 0x00, 0x00][..]);
        let fixed_header = FixedHeader::new(PacketType::ConnAck, 0, 3);
        assert!(ConnAckPacket::decode_body(&mut buf, &fixed_header).is_err());
    }

    #[test]
    fn test_unknown_reason_code_rejected() {
        let mut buf = BytesMut::from(&[0x00, 0x7F, 0x00][..]);
        let fixed_header = FixedHeader::new(PacketType::ConnAck, 0, 3);
        assert!(matches!(
            ConnAckPacket::decode_body(&mut buf, &fixed_header),
            Err(MqttError::InvalidReasonCode(0x7F))
        ));
    }
}
