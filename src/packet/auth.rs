use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::protocol::v5::reason_codes::ReasonCode;

use bytes::{Buf, BufMut};

fn is_valid_auth_reason_code(code: ReasonCode) -> bool {
    matches!(
        code,
        ReasonCode::Success | ReasonCode::ContinueAuthentication | ReasonCode::ReAuthenticate
    )
}

/// Enhanced-authentication exchange. The core passes these through to
/// event subscribers; it implements no authentication logic itself.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthPacket {
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl AuthPacket {
    #[must_use]
    pub fn new(reason_code: ReasonCode) -> Self {
        Self {
            reason_code,
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn authentication_method(&self) -> Option<&str> {
        self.properties.get_authentication_method()
    }
}

impl MqttPacket for AuthPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Auth
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.reason_code == ReasonCode::Success && self.properties.is_empty() {
            return Ok(());
        }
        buf.put_u8(self.reason_code.into());
        self.properties.encode(buf)
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        if fixed_header.remaining_length == 0 {
            return Ok(Self::new(ReasonCode::Success));
        }

        let code_byte = buf.get_u8();
        let reason_code = ReasonCode::from_u8(code_byte)
            .filter(|code| is_valid_auth_reason_code(*code))
            .ok_or_else(|| {
                MqttError::MalformedPacket(format!("Invalid AUTH reason code: 0x{code_byte:02X}"))
            })?;

        let properties = if fixed_header.remaining_length > 1 {
            Properties::decode(buf)?
        } else {
            Properties::default()
        };

        Ok(Self {
            reason_code,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use bytes::BytesMut;

    #[test]
    fn test_auth_round_trip() {
        let mut packet = AuthPacket::new(ReasonCode::ContinueAuthentication);
        packet
            .properties
            .set_authentication_method("SCRAM-SHA-256".to_string());
        packet
            .properties
            .set_authentication_data(Bytes::from_static(b"challenge"));

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = AuthPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.authentication_method(), Some("SCRAM-SHA-256"));
    }

    #[test]
    fn test_empty_auth_is_success() {
        let packet = AuthPacket::new(ReasonCode::Success);
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0xF0, 0x00]);
    }

    #[test]
    fn test_invalid_auth_reason_code() {
        let mut buf = BytesMut::from(&[0x87][..]);
        let fixed_header = FixedHeader::new(PacketType::Auth, 0, 1);
        assert!(AuthPacket::decode_body(&mut buf, &fixed_header).is_err());
    }
}
