//! The four QoS acknowledgement packets.
//!
//! PUBACK, PUBREC, PUBREL, and PUBCOMP share one wire shape: packet
//! identifier, optional reason code, optional properties. A remaining
//! length of exactly 2 means reason 0x00 with no properties. Each type
//! carries its own set of legal reason codes, listed in its
//! `define_ack_packet!` invocation.

use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::protocol::v5::reason_codes::ReasonCode;

use bytes::{Buf, BufMut};

macro_rules! define_ack_packet {
    (
        $(#[$doc:meta])*
        $name:ident, $packet_type:expr, $label:literal,
        accepts: [$($accepted:ident),+ $(,)?]
    ) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            pub packet_id: u16,
            pub reason_code: ReasonCode,
            pub properties: Properties,
        }

        impl $name {
            #[must_use]
            pub fn new(packet_id: u16) -> Self {
                Self {
                    packet_id,
                    reason_code: ReasonCode::Success,
                    properties: Properties::default(),
                }
            }

            #[must_use]
            pub fn new_with_reason(packet_id: u16, reason_code: ReasonCode) -> Self {
                Self {
                    packet_id,
                    reason_code,
                    properties: Properties::default(),
                }
            }

            #[must_use]
            pub fn with_reason_string(mut self, reason: String) -> Self {
                self.properties.set_reason_string(reason);
                self
            }

            fn is_legal_reason_code(code: ReasonCode) -> bool {
                matches!(code, $(ReasonCode::$accepted)|+)
            }
        }

        impl MqttPacket for $name {
            fn packet_type(&self) -> PacketType {
                $packet_type
            }

            fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
                buf.put_u16(self.packet_id);

                // Reason and properties are omitted entirely for the
                // common success-with-nothing-to-say case.
                if self.reason_code != ReasonCode::Success || !self.properties.is_empty() {
                    buf.put_u8(self.reason_code.into());
                    if !self.properties.is_empty() {
                        self.properties.encode(buf)?;
                    }
                }
                Ok(())
            }

            fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
                if buf.remaining() < 2 {
                    return Err(MqttError::MalformedPacket(concat!(
                        $label,
                        " missing packet identifier"
                    )
                    .to_string()));
                }
                let packet_id = buf.get_u16();

                if fixed_header.remaining_length == 2 {
                    return Ok(Self::new(packet_id));
                }

                if !buf.has_remaining() {
                    return Err(MqttError::MalformedPacket(concat!(
                        $label,
                        " truncated before reason code"
                    )
                    .to_string()));
                }

                let code_byte = buf.get_u8();
                let reason_code = ReasonCode::from_u8(code_byte)
                    .filter(|code| Self::is_legal_reason_code(*code))
                    .ok_or_else(|| {
                        MqttError::MalformedPacket(format!(
                            concat!("Invalid ", $label, " reason code: 0x{:02X}"),
                            code_byte
                        ))
                    })?;

                let properties = if fixed_header.remaining_length > 3 {
                    Properties::decode(buf)?
                } else {
                    Properties::default()
                };

                Ok(Self {
                    packet_id,
                    reason_code,
                    properties,
                })
            }
        }
    };
}

define_ack_packet! {
    /// PUBACK: QoS 1 publish acknowledgment.
    PubAckPacket, PacketType::PubAck, "PUBACK",
    accepts: [
        Success,
        NoMatchingSubscribers,
        UnspecifiedError,
        ImplementationSpecificError,
        NotAuthorized,
        TopicNameInvalid,
        PacketIdentifierInUse,
        QuotaExceeded,
        PayloadFormatInvalid,
    ]
}

define_ack_packet! {
    /// PUBREC: QoS 2 delivery part 1 (publish received). Carries the
    /// same reason codes as PUBACK.
    PubRecPacket, PacketType::PubRec, "PUBREC",
    accepts: [
        Success,
        NoMatchingSubscribers,
        UnspecifiedError,
        ImplementationSpecificError,
        NotAuthorized,
        TopicNameInvalid,
        PacketIdentifierInUse,
        QuotaExceeded,
        PayloadFormatInvalid,
    ]
}

define_ack_packet! {
    /// PUBREL: QoS 2 delivery part 2 (publish release). Fixed-header
    /// flags are the reserved 0b0010.
    PubRelPacket, PacketType::PubRel, "PUBREL",
    accepts: [Success, PacketIdentifierNotFound]
}

define_ack_packet! {
    /// PUBCOMP: QoS 2 delivery part 3 (publish complete).
    PubCompPacket, PacketType::PubComp, "PUBCOMP",
    accepts: [Success, PacketIdentifierNotFound]
}
