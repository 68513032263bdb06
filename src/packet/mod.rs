//! Fixed header and the fifteen MQTT 5 control packet variants.

pub mod ack;
pub mod auth;
pub mod connack;
pub mod connect;
pub mod disconnect;
pub mod publish;
pub mod suback;
pub mod subscribe;
pub mod subscribe_options;
pub mod unsuback;
pub mod unsubscribe;

use crate::encoding::{decode_variable_int, encode_variable_int};
use crate::error::{MqttError, Result};

use bytes::{Buf, BufMut, BytesMut};

pub use ack::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket};
pub use auth::AuthPacket;
pub use connack::ConnAckPacket;
pub use connect::{ConnectPacket, WillMessage};
pub use disconnect::DisconnectPacket;
pub use publish::PublishPacket;
pub use suback::SubAckPacket;
pub use subscribe::{SubscribePacket, TopicFilter};
pub use subscribe_options::{RetainHandling, SubscriptionOptions};
pub use unsuback::UnsubAckPacket;
pub use unsubscribe::UnsubscribePacket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
    Auth = 15,
}

impl PacketType {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Connect),
            2 => Some(Self::ConnAck),
            3 => Some(Self::Publish),
            4 => Some(Self::PubAck),
            5 => Some(Self::PubRec),
            6 => Some(Self::PubRel),
            7 => Some(Self::PubComp),
            8 => Some(Self::Subscribe),
            9 => Some(Self::SubAck),
            10 => Some(Self::Unsubscribe),
            11 => Some(Self::UnsubAck),
            12 => Some(Self::PingReq),
            13 => Some(Self::PingResp),
            14 => Some(Self::Disconnect),
            15 => Some(Self::Auth),
            _ => None,
        }
    }

    /// The fixed flag nibble required for this type, or `None` for PUBLISH
    /// whose flags carry retain/QoS/dup.
    #[must_use]
    pub fn required_flags(self) -> Option<u8> {
        match self {
            Self::Publish => None,
            Self::PubRel | Self::Subscribe | Self::Unsubscribe => Some(0x02),
            _ => Some(0x00),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        packet_type as u8
    }
}

/// One byte of packet type and flags, then the remaining length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub remaining_length: u32,
}

impl FixedHeader {
    #[must_use]
    pub fn new(packet_type: PacketType, flags: u8, remaining_length: u32) -> Self {
        Self {
            packet_type,
            flags,
            remaining_length,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8((self.packet_type as u8) << 4 | (self.flags & 0x0F));
        encode_variable_int(buf, self.remaining_length)
    }

    /// Decodes the header and validates reserved flag nibbles. The
    /// remaining length is the exact byte count of variable header plus
    /// payload still to be consumed.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "Insufficient data for fixed header".to_string(),
            ));
        }

        let byte = buf.get_u8();
        let packet_type = PacketType::from_u8(byte >> 4)
            .ok_or(MqttError::InvalidPacketType(byte >> 4))?;
        let flags = byte & 0x0F;

        if let Some(required) = packet_type.required_flags() {
            if flags != required {
                return Err(MqttError::MalformedPacket(format!(
                    "Invalid {packet_type:?} flags: expected 0x{required:02X}, got 0x{flags:02X}"
                )));
            }
        }

        let remaining_length = decode_variable_int(buf)?;

        Ok(Self {
            packet_type,
            flags,
            remaining_length,
        })
    }
}

/// Common shape of every control packet: per-variant body codec, provided
/// whole-packet encode.
pub trait MqttPacket: Sized {
    fn packet_type(&self) -> PacketType;

    fn flags(&self) -> u8 {
        self.packet_type().required_flags().unwrap_or(0)
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()>;

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self>;

    /// Encodes the fixed header (remaining length computed from the body)
    /// followed by the body.
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let mut body = BytesMut::new();
        self.encode_body(&mut body)?;

        let remaining_length =
            u32::try_from(body.len()).map_err(|_| MqttError::PacketTooLarge {
                size: body.len(),
                max: crate::encoding::VARIABLE_INT_MAX as usize,
            })?;

        FixedHeader::new(self.packet_type(), self.flags(), remaining_length).encode(buf)?;
        buf.put_slice(&body);
        Ok(())
    }
}

/// A decoded control packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect(Box<ConnectPacket>),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq,
    PingResp,
    Disconnect(DisconnectPacket),
    Auth(AuthPacket),
}

impl Packet {
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::PubRec(_) => PacketType::PubRec,
            Packet::PubRel(_) => PacketType::PubRel,
            Packet::PubComp(_) => PacketType::PubComp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::UnsubAck(_) => PacketType::UnsubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect(_) => PacketType::Disconnect,
            Packet::Auth(_) => PacketType::Auth,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        match self {
            Packet::Connect(p) => p.encode(buf),
            Packet::ConnAck(p) => p.encode(buf),
            Packet::Publish(p) => p.encode(buf),
            Packet::PubAck(p) => p.encode(buf),
            Packet::PubRec(p) => p.encode(buf),
            Packet::PubRel(p) => p.encode(buf),
            Packet::PubComp(p) => p.encode(buf),
            Packet::Subscribe(p) => p.encode(buf),
            Packet::SubAck(p) => p.encode(buf),
            Packet::Unsubscribe(p) => p.encode(buf),
            Packet::UnsubAck(p) => p.encode(buf),
            Packet::PingReq => FixedHeader::new(PacketType::PingReq, 0, 0).encode(buf),
            Packet::PingResp => FixedHeader::new(PacketType::PingResp, 0, 0).encode(buf),
            Packet::Disconnect(p) => p.encode(buf),
            Packet::Auth(p) => p.encode(buf),
        }
    }

    /// Decodes the body following an already-read fixed header. `buf` must
    /// hold exactly `fixed_header.remaining_length` bytes of this packet.
    pub fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        let packet = match fixed_header.packet_type {
            PacketType::Connect => {
                Packet::Connect(Box::new(ConnectPacket::decode_body(buf, fixed_header)?))
            }
            PacketType::ConnAck => Packet::ConnAck(ConnAckPacket::decode_body(buf, fixed_header)?),
            PacketType::Publish => Packet::Publish(PublishPacket::decode_body(buf, fixed_header)?),
            PacketType::PubAck => Packet::PubAck(PubAckPacket::decode_body(buf, fixed_header)?),
            PacketType::PubRec => Packet::PubRec(PubRecPacket::decode_body(buf, fixed_header)?),
            PacketType::PubRel => Packet::PubRel(PubRelPacket::decode_body(buf, fixed_header)?),
            PacketType::PubComp => Packet::PubComp(PubCompPacket::decode_body(buf, fixed_header)?),
            PacketType::Subscribe => {
                Packet::Subscribe(SubscribePacket::decode_body(buf, fixed_header)?)
            }
            PacketType::SubAck => Packet::SubAck(SubAckPacket::decode_body(buf, fixed_header)?),
            PacketType::Unsubscribe => {
                Packet::Unsubscribe(UnsubscribePacket::decode_body(buf, fixed_header)?)
            }
            PacketType::UnsubAck => {
                Packet::UnsubAck(UnsubAckPacket::decode_body(buf, fixed_header)?)
            }
            PacketType::PingReq => Packet::PingReq,
            PacketType::PingResp => Packet::PingResp,
            PacketType::Disconnect => {
                Packet::Disconnect(DisconnectPacket::decode_body(buf, fixed_header)?)
            }
            PacketType::Auth => Packet::Auth(AuthPacket::decode_body(buf, fixed_header)?),
        };
        Ok(packet)
    }
}
