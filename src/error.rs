use crate::packet::PacketType;
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::store::StoreError;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MqttError>;

#[derive(Debug, Clone, Error)]
pub enum MqttError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Timeout")]
    Timeout,

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Unexpected packet type received: {0:?}")]
    UnexpectedPacket(PacketType),

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid topic name: {0}")]
    InvalidTopicName(String),

    #[error("Invalid topic filter: {0}")]
    InvalidTopicFilter(String),

    #[error("Invalid QoS: {0}")]
    InvalidQoS(u8),

    #[error("Invalid packet type: {0}")]
    InvalidPacketType(u8),

    #[error("Invalid reason code: {0}")]
    InvalidReasonCode(u8),

    #[error("Invalid property ID: {0}")]
    InvalidPropertyId(u8),

    #[error("Duplicate property ID: {0}")]
    DuplicatePropertyId(u8),

    #[error("Server returned {0}")]
    ReasonCode(ReasonCode),

    #[error("Keep alive timeout")]
    KeepAliveTimeout,

    #[error("Receive maximum exceeded")]
    ReceiveMaximumExceeded,

    #[error("Packet identifier already in use: {0}")]
    PacketIdInUse(u16),

    #[error("Packet identifiers exhausted")]
    PacketIdExhausted,

    #[error("String too long: {0} bytes exceeds maximum of 65535")]
    StringTooLong(usize),

    #[error("Packet too large: size {size} exceeds maximum {max}")]
    PacketTooLarge { size: usize, max: usize },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl MqttError {
    /// True for the transient end-of-stream condition that handshake reads
    /// retry with backoff rather than surface to the caller.
    #[must_use]
    pub fn is_transient_eof(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

impl From<std::io::Error> for MqttError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => MqttError::ConnectionClosed,
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => MqttError::Timeout,
            _ => MqttError::Io(err.to_string()),
        }
    }
}
