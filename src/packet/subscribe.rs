use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::subscribe_options::SubscriptionOptions;
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::types::QoS;

use bytes::{Buf, BufMut};

/// One requested subscription: a filter and its options byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    pub filter: String,
    pub options: SubscriptionOptions,
}

impl TopicFilter {
    #[must_use]
    pub fn new(filter: impl Into<String>, qos: QoS) -> Self {
        Self {
            filter: filter.into(),
            options: SubscriptionOptions::new(qos),
        }
    }

    #[must_use]
    pub fn with_options(filter: impl Into<String>, options: SubscriptionOptions) -> Self {
        Self {
            filter: filter.into(),
            options,
        }
    }
}

/// Subscribe request: packet identifier, properties, then one or more
/// (filter, options) pairs. Reserved fixed-header flags 0b0010.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<TopicFilter>,
    pub properties: Properties,
}

impl SubscribePacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            filters: Vec::new(),
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn add_filter(mut self, filter: impl Into<String>, qos: QoS) -> Self {
        self.filters.push(TopicFilter::new(filter, qos));
        self
    }
}

impl MqttPacket for SubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Subscribe
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.filters.is_empty() {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }

        buf.put_u16(self.packet_id);
        self.properties.encode(buf)?;

        for filter in &self.filters {
            encode_string(buf, &filter.filter)?;
            buf.put_u8(filter.options.encode());
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        if fixed_header.flags != 0x02 {
            return Err(MqttError::MalformedPacket(format!(
                "Invalid SUBSCRIBE flags: expected 0x02, got 0x{:02X}",
                fixed_header.flags
            )));
        }

        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        let properties = Properties::decode(buf)?;

        let mut filters = Vec::new();
        while buf.has_remaining() {
            let filter = decode_string(buf)?;
            if !buf.has_remaining() {
                return Err(MqttError::MalformedPacket(
                    "Missing subscription options for topic filter".to_string(),
                ));
            }
            let options = SubscriptionOptions::decode(buf.get_u8())?;
            filters.push(TopicFilter { filter, options });
        }

        if filters.is_empty() {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE must contain at least one topic filter".to_string(),
            ));
        }

        Ok(Self {
            packet_id,
            filters,
            properties,
        })
    }
}
