use crate::encoding::{decode_binary, decode_string, encode_binary, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::types::{ProtocolVersion, QoS};

use bytes::{Buf, BufMut, Bytes};

const PROTOCOL_NAME: &str = "MQTT";

const FLAG_CLEAN_START: u8 = 1 << 1;
const FLAG_WILL: u8 = 1 << 2;
const FLAG_WILL_RETAIN: u8 = 1 << 5;
const FLAG_PASSWORD: u8 = 1 << 6;
const FLAG_USERNAME: u8 = 1 << 7;

/// The message the broker publishes on the client's behalf after an
/// ungraceful disconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct WillMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub properties: Properties,
}

impl WillMessage {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
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
    pub fn with_delay_interval(mut self, seconds: u32) -> Self {
        self.properties.set_will_delay_interval(seconds);
        self
    }
}

/// Connection request. Doubles as the client's configuration surface: the
/// builder methods cover clean start, keep-alive, session expiry, receive
/// maximum, will, credentials, and enhanced-auth pass-through.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectPacket {
    pub version: ProtocolVersion,
    pub client_id: String,
    pub clean_start: bool,
    pub keep_alive: u16,
    pub username: Option<String>,
    pub password: Option<Bytes>,
    pub will: Option<WillMessage>,
    pub properties: Properties,
}

impl ConnectPacket {
    /// An empty client identifier asks the server to assign one.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            version: ProtocolVersion::V5,
            client_id: client_id.into(),
            clean_start: false,
            keep_alive: 0,
            username: None,
            password: None,
            will: None,
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn with_clean_start(mut self, clean_start: bool) -> Self {
        self.clean_start = clean_start;
        self
    }

    /// Proposed keep-alive in seconds; zero disables keep-alive.
    #[must_use]
    pub fn with_keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = seconds;
        self
    }

    #[must_use]
    pub fn with_session_expiry(mut self, seconds: u32) -> Self {
        self.properties.set_session_expiry_interval(seconds);
        self
    }

    /// Maximum concurrent in-flight inbound QoS>0 publishes. Zero means
    /// "match the server's advertised value".
    #[must_use]
    pub fn with_receive_maximum(mut self, value: u16) -> Self {
        if value > 0 {
            self.properties.set_receive_maximum(value);
        }
        self
    }

    #[must_use]
    pub fn with_will(mut self, will: WillMessage) -> Self {
        self.will = Some(will);
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: &[u8]) -> Self {
        self.username = Some(username.into());
        self.password = Some(Bytes::copy_from_slice(password));
        self
    }

    #[must_use]
    pub fn with_authentication(mut self, method: impl Into<String>, data: Option<Bytes>) -> Self {
        self.properties.set_authentication_method(method.into());
        if let Some(data) = data {
            self.properties.set_authentication_data(data);
        }
        self
    }

    #[must_use]
    pub fn session_expiry(&self) -> u32 {
        self.properties.get_session_expiry_interval().unwrap_or(0)
    }

    #[must_use]
    pub fn receive_maximum(&self) -> u16 {
        self.properties.get_receive_maximum().unwrap_or(0)
    }

    fn flags_byte(&self) -> u8 {
        let mut flags = 0u8;
        if self.clean_start {
            flags |= FLAG_CLEAN_START;
        }
        if let Some(will) = &self.will {
            flags |= FLAG_WILL;
            flags |= (will.qos as u8) << 3;
            if will.retain {
                flags |= FLAG_WILL_RETAIN;
            }
        }
        if self.password.is_some() {
            flags |= FLAG_PASSWORD;
        }
        if self.username.is_some() {
            flags |= FLAG_USERNAME;
        }
        flags
    }
}

impl MqttPacket for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        encode_string(buf, PROTOCOL_NAME)?;
        buf.put_u8(self.version.as_u8());
        buf.put_u8(self.flags_byte());
        buf.put_u16(self.keep_alive);
        self.properties.encode(buf)?;

        // Payload ordering: client id, will block, username, password.
        encode_string(buf, &self.client_id)?;

        if let Some(will) = &self.will {
            will.properties.encode(buf)?;
            encode_string(buf, &will.topic)?;
            encode_binary(buf, &will.payload)?;
        }

        if let Some(username) = &self.username {
            encode_string(buf, username)?;
        }

        if let Some(password) = &self.password {
            encode_binary(buf, password)?;
        }

        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        let protocol_name = decode_string(buf)?;
        if protocol_name != PROTOCOL_NAME {
            return Err(MqttError::MalformedPacket(format!(
                "Invalid protocol name: {protocol_name:?}"
            )));
        }

        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "CONNECT truncated before version".to_string(),
            ));
        }
        let version = buf.get_u8();
        if version != ProtocolVersion::V5.as_u8() {
            return Err(MqttError::MalformedPacket(format!(
                "Unsupported protocol version: {version}"
            )));
        }

        if buf.remaining() < 3 {
            return Err(MqttError::MalformedPacket(
                "CONNECT truncated before flags".to_string(),
            ));
        }
        let flags = buf.get_u8();
        if flags & 0x01 != 0 {
            return Err(MqttError::MalformedPacket(
                "CONNECT reserved flag bit must be 0".to_string(),
            ));
        }
        let keep_alive = buf.get_u16();

        let properties = Properties::decode(buf)?;
        let client_id = decode_string(buf)?;

        let will = if flags & FLAG_WILL != 0 {
            let will_properties = Properties::decode(buf)?;
            let topic = decode_string(buf)?;
            let payload = decode_binary(buf)?;
            Some(WillMessage {
                topic,
                payload,
                qos: QoS::try_from((flags >> 3) & 0x03)?,
                retain: flags & FLAG_WILL_RETAIN != 0,
                properties: will_properties,
            })
        } else {
            None
        };

        let username = if flags & FLAG_USERNAME != 0 {
            Some(decode_string(buf)?)
        } else {
            None
        };

        let password = if flags & FLAG_PASSWORD != 0 {
            Some(decode_binary(buf)?)
        } else {
            None
        };

        Ok(Self {
            version: ProtocolVersion::V5,
            client_id,
            clean_start: flags & FLAG_CLEAN_START != 0,
            keep_alive,
            username,
            password,
            will,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn round_trip(packet: &ConnectPacket) -> ConnectPacket {
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        assert_eq!(fixed_header.packet_type, PacketType::Connect);
        assert_eq!(fixed_header.remaining_length as usize, buf.len());

        ConnectPacket::decode_body(&mut buf, &fixed_header).unwrap()
    }

    #[test]
    fn test_minimal_connect_round_trip() {
        let packet = ConnectPacket::new("client-1").with_keep_alive(60);
        let decoded = round_trip(&packet);
        assert_eq!(decoded, packet);
        assert_eq!(decoded.keep_alive, 60);
        assert!(!decoded.clean_start);
    }

    #[test]
    fn test_connect_with_everything() {
        let will = WillMessage::new("status/client-1", &b"offline"[..])
            .with_qos(QoS::AtLeastOnce)
            .with_retain(true)
            .with_delay_interval(10);

        let packet = ConnectPacket::new("client-1")
            .with_clean_start(true)
            .with_keep_alive(30)
            .with_session_expiry(300)
            .with_receive_maximum(16)
            .with_will(will)
            .with_credentials("user", b"secret");

        let decoded = round_trip(&packet);
        assert_eq!(decoded, packet);

        assert_eq!(decoded.username.as_deref(), Some("user"));
        assert_eq!(decoded.password.as_deref(), Some(&b"secret"[..]));
        assert_eq!(decoded.session_expiry(), 300);
        assert_eq!(decoded.receive_maximum(), 16);

        let will = decoded.will.unwrap();
        assert_eq!(will.topic, "status/client-1");
        assert_eq!(&will.payload[..], b"offline");
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(will.retain);
        assert_eq!(will.properties.get_will_delay_interval(), Some(10));
    }

    #[test]
    fn test_empty_client_id_means_server_assigned() {
        let packet = ConnectPacket::new("");
        let decoded = round_trip(&packet);
        assert_eq!(decoded.client_id, "");
    }

    #[test]
    fn test_flags_byte_layout() {
        let packet = ConnectPacket::new("c")
            .with_clean_start(true)
            .with_will(
                WillMessage::new("t", &b"p"[..])
                    .with_qos(QoS::ExactlyOnce)
                    .with_retain(true),
            )
            .with_credentials("u", b"p");

        // clean start | will | will qos 2 | will retain | password | username
        assert_eq!(
            packet.flags_byte(),
            0b0000_0010 | 0b0000_0100 | 0b0001_0000 | 0b0010_0000 | 0b0100_0000 | 0b1000_0000
        );
    }

    #[test]
    fn test_reserved_flag_bit_rejected() {
        let packet = ConnectPacket::new("c");
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        let mut body = buf.to_vec();
        body[7] |= 0x01; // flags byte follows "MQTT" (6 bytes) + version
        let mut tampered = BytesMut::from(&body[..]);
        assert!(ConnectPacket::decode_body(&mut tampered, &fixed_header).is_err());
    }

    #[test]
    fn test_wrong_protocol_name_rejected() {
        let mut buf = BytesMut::new();
        encode_string(&mut buf, "MQIsdp").unwrap();
        buf.put_u8(5);

        let fixed_header = FixedHeader::new(PacketType::Connect, 0, buf.len() as u32);
        assert!(ConnectPacket::decode_body(&mut buf, &fixed_header).is_err());
    }

    #[test]
    fn test_receive_maximum_zero_is_omitted() {
        let packet = ConnectPacket::new("c").with_receive_maximum(0);
        assert!(packet.properties.is_empty());
        assert_eq!(packet.receive_maximum(), 0);
    }
}
