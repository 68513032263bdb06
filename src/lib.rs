//! A single-connection MQTT 5 client protocol engine.
//!
//! The crate exchanges control packets with a broker over any connected
//! byte stream, maintains the session state machine (connect, keep-alive,
//! subscribe, publish at QoS 0/1/2, disconnect), enforces the protocol's
//! send/receive quotas, dispatches incoming publishes to subscriber sinks
//! by topic-filter matching, and persists unacknowledged flows through a
//! pluggable store so a host can replay them after reconnecting.
//!
//! The host supplies the transport (TCP, TLS, anything
//! `AsyncRead + AsyncWrite`), schedules keep-alive, and drives
//! [`Client::poll`] from a reader task; the engine does not reconnect on
//! its own.

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::if_not_else)]

pub mod backoff;
pub mod client;
pub mod encoding;
pub mod error;
pub mod events;
pub mod packet;
pub mod packet_id;
pub mod protocol;
pub mod session;
pub mod store;
pub mod time;
pub mod topic_matching;
pub mod types;
pub mod validation;

mod transport;

pub use client::{Client, ClientOptions, Topic};
pub use error::{MqttError, Result};
pub use events::{Event, EventChannel, EventChannelHandle};
pub use packet::{
    AuthPacket, ConnAckPacket, ConnectPacket, DisconnectPacket, FixedHeader, MqttPacket, Packet,
    PacketType,
    PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, PublishPacket, RetainHandling,
    SubAckPacket, SubscribePacket, SubscriptionOptions, UnsubAckPacket, UnsubscribePacket,
    WillMessage,
};
pub use protocol::v5::properties::{Properties, PropertyId, PropertyValue};
pub use protocol::v5::reason_codes::ReasonCode;
pub use store::{MemoryStore, PacketStore, StoreError, StoredPacket};
pub use time::Deadline;
pub use topic_matching::matches as topic_matches_filter;
pub use types::{ProtocolVersion, QoS};
pub use validation::{is_valid_topic_filter, is_valid_topic_name};
