//! Scripted-broker helpers shared by the integration tests.
//!
//! Each test holds the far end of an in-memory duplex stream and plays
//! the broker by reading and writing raw control packets.

#![allow(dead_code)]

use mqtt5_core::{
    Client, ClientOptions, ConnAckPacket, ConnectPacket, Deadline, FixedHeader, Packet,
    PropertyId, PropertyValue, ReasonCode,
};

use bytes::{Buf, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::Duration;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Reads one whole control packet off the broker side of the stream.
pub async fn read_packet(stream: &mut DuplexStream) -> Packet {
    let mut header = vec![stream.read_u8().await.expect("read header byte")];
    loop {
        let byte = stream.read_u8().await.expect("read length byte");
        header.push(byte);
        if byte & 0x80 == 0 {
            break;
        }
    }

    let mut header_buf = BytesMut::from(&header[..]);
    let fixed_header = FixedHeader::decode(&mut header_buf).expect("decode fixed header");

    let mut body = vec![0u8; fixed_header.remaining_length as usize];
    stream.read_exact(&mut body).await.expect("read body");

    let mut body = bytes::Bytes::from(body);
    let packet = Packet::decode_body(&mut body, &fixed_header).expect("decode packet");
    assert!(!body.has_remaining(), "packet left undecoded bytes");
    packet
}

/// Writes one control packet from the broker side.
pub async fn write_packet(stream: &mut DuplexStream, packet: &Packet) {
    let mut buf = BytesMut::new();
    packet.encode(&mut buf).expect("encode packet");
    stream.write_all(&buf).await.expect("write packet");
    stream.flush().await.expect("flush packet");
}

pub fn connack_success() -> ConnAckPacket {
    ConnAckPacket::new(ReasonCode::Success)
}

pub fn connack_with_server_keep_alive(seconds: u16) -> ConnAckPacket {
    let mut connack = connack_success();
    connack
        .properties
        .add(
            PropertyId::ServerKeepAlive,
            PropertyValue::TwoByteInteger(seconds),
        )
        .unwrap();
    connack
}

/// Builds a client over an in-memory stream and completes the CONNECT
/// handshake against the scripted broker end, which is returned.
pub async fn connected_client(
    options: ClientOptions,
    connect: ConnectPacket,
    connack: ConnAckPacket,
) -> (Arc<Client>, DuplexStream) {
    let (near, far) = tokio::io::duplex(16 * 1024);
    let client = Arc::new(Client::new(near, options));

    let mut broker = far;
    let (result, ()) = tokio::join!(
        client.connect(Deadline::after(CONNECT_TIMEOUT), connect),
        async {
            let packet = read_packet(&mut broker).await;
            assert!(
                matches!(packet, Packet::Connect(_)),
                "expected CONNECT, got {packet:?}"
            );
            write_packet(&mut broker, &Packet::ConnAck(connack)).await;
        }
    );
    result.expect("connect");

    (client, broker)
}
