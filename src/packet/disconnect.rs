use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::protocol::v5::reason_codes::ReasonCode;

use bytes::{Buf, BufMut};

/// Disconnect notification. A remaining length of zero means normal
/// disconnection (reason 0x00) with no properties. Reason 0x04 asks the
/// server to publish the will message.
#[derive(Debug, Clone, PartialEq)]
pub struct DisconnectPacket {
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl Default for DisconnectPacket {
    fn default() -> Self {
        Self::new(ReasonCode::Success)
    }
}

impl DisconnectPacket {
    #[must_use]
    pub fn new(reason_code: ReasonCode) -> Self {
        Self {
            reason_code,
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn with_session_expiry(mut self, seconds: u32) -> Self {
        self.properties.set_session_expiry_interval(seconds);
        self
    }

    #[must_use]
    pub fn session_expiry(&self) -> Option<u32> {
        self.properties.get_session_expiry_interval()
    }
}

impl MqttPacket for DisconnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Disconnect
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
            return Ok(Self::default());
        }

        let code_byte = buf.get_u8();
        let reason_code = ReasonCode::from_u8(code_byte)
            .ok_or(MqttError::InvalidReasonCode(code_byte))?;

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
