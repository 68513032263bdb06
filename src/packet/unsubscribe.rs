use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;

use bytes::{Buf, BufMut};

/// Unsubscribe request. Reserved fixed-header flags 0b0010.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<String>,
    pub properties: Properties,
}

impl UnsubscribePacket {
    #[must_use]
    pub fn new(packet_id: u16, filters: Vec<String>) -> Self {
        Self {
            packet_id,
            filters,
            properties: Properties::default(),
        }
    }
}

impl MqttPacket for UnsubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Unsubscribe
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.filters.is_empty() {
            return Err(MqttError::MalformedPacket(
                "UNSUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }

        buf.put_u16(self.packet_id);
        self.properties.encode(buf)?;
        for filter in &self.filters {
            encode_string(buf, filter)?;
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        if fixed_header.flags != 0x02 {
            return Err(MqttError::MalformedPacket(format!(
                "Invalid UNSUBSCRIBE flags: expected 0x02, got 0x{:02X}",
                fixed_header.flags
            )));
        }

        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "UNSUBSCRIBE missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        let properties = Properties::decode(buf)?;

        let mut filters = Vec::new();
        while buf.has_remaining() {
            filters.push(decode_string(buf)?);
        }

        if filters.is_empty() {
            return Err(MqttError::MalformedPacket(
                "UNSUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }

        Ok(Self {
            packet_id,
            filters,
            properties,
        })
    }
}
