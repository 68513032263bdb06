//! QoS 1/2 delivery flows, quota enforcement, and persistence.

mod common;

use common::{connack_success, connected_client, read_packet, write_packet};
use mqtt5_core::{
    ClientOptions, ConnectPacket, Deadline, MemoryStore, MqttError, Packet, PacketStore,
    PacketType, PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, PublishPacket, QoS,
    ReasonCode, StoredPacket,
};

use std::sync::Arc;
use tokio::time::Duration;

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(5))
}

#[tokio::test]
async fn qos1_round_trip_persists_and_restores_quota() {
    let store = Arc::new(MemoryStore::new());
    let (client, mut broker) = connected_client(
        ClientOptions::new().with_store(store.clone()),
        ConnectPacket::new("C"),
        connack_success(),
    )
    .await;
    let mut events = client.create_event_channel(4);
    let initial_quota = client.send_quota().unwrap();

    let publish = PublishPacket::new("a", &b"x"[..])
        .with_qos(QoS::AtLeastOnce)
        .with_packet_id(42);
    client.publish(deadline(), publish).await.unwrap();

    // Persisted before the wire write, quota taken by the send.
    assert!(matches!(
        store.get(42),
        Ok(StoredPacket::Publish(p)) if p.packet_id == Some(42)
    ));
    assert_eq!(client.send_quota().unwrap(), initial_quota - 1);

    let packet = read_packet(&mut broker).await;
    let Packet::Publish(on_wire) = packet else {
        panic!("expected PUBLISH, got {packet:?}");
    };
    assert_eq!(on_wire.packet_id, Some(42));
    assert_eq!(on_wire.qos, QoS::AtLeastOnce);

    write_packet(&mut broker, &Packet::PubAck(PubAckPacket::new(42))).await;
    client.poll(deadline()).await.unwrap();

    assert!(store.is_empty());
    assert_eq!(client.send_quota().unwrap(), initial_quota);

    let event = events.recv().await.unwrap();
    assert_eq!(event.packet_type, PacketType::PubAck);
}

#[tokio::test]
async fn qos2_round_trip_swaps_publish_for_pubrec_record() {
    let store = Arc::new(MemoryStore::new());
    let (client, mut broker) = connected_client(
        ClientOptions::new().with_store(store.clone()),
        ConnectPacket::new("C"),
        connack_success(),
    )
    .await;
    let initial_quota = client.send_quota().unwrap();

    let publish = PublishPacket::new("b", &b"y"[..])
        .with_qos(QoS::ExactlyOnce)
        .with_packet_id(7);
    client.publish(deadline(), publish).await.unwrap();

    assert!(matches!(store.get(7), Ok(StoredPacket::Publish(_))));
    assert_eq!(client.send_quota().unwrap(), initial_quota - 1);
    assert!(matches!(read_packet(&mut broker).await, Packet::Publish(_)));

    write_packet(&mut broker, &Packet::PubRec(PubRecPacket::new(7))).await;
    client.poll(deadline()).await.unwrap();

    // The stored PUBLISH became a PUBREC record and PUBREL went out; the
    // quota stays taken until PUBCOMP.
    assert!(matches!(store.get(7), Ok(StoredPacket::PubRec(_))));
    assert_eq!(client.send_quota().unwrap(), initial_quota - 1);
    let packet = read_packet(&mut broker).await;
    let Packet::PubRel(pubrel) = packet else {
        panic!("expected PUBREL, got {packet:?}");
    };
    assert_eq!(pubrel.packet_id, 7);

    write_packet(&mut broker, &Packet::PubComp(PubCompPacket::new(7))).await;
    client.poll(deadline()).await.unwrap();

    assert!(store.is_empty());
    assert_eq!(client.send_quota().unwrap(), initial_quota);
}

#[tokio::test]
async fn qos2_flow_aborted_by_error_pubrec() {
    let store = Arc::new(MemoryStore::new());
    let (client, mut broker) = connected_client(
        ClientOptions::new().with_store(store.clone()),
        ConnectPacket::new("C"),
        connack_success(),
    )
    .await;
    let initial_quota = client.send_quota().unwrap();

    let publish = PublishPacket::new("b", &b"y"[..])
        .with_qos(QoS::ExactlyOnce)
        .with_packet_id(9);
    client.publish(deadline(), publish).await.unwrap();
    assert!(matches!(read_packet(&mut broker).await, Packet::Publish(_)));

    write_packet(
        &mut broker,
        &Packet::PubRec(PubRecPacket::new_with_reason(
            9,
            ReasonCode::QuotaExceeded,
        )),
    )
    .await;
    client.poll(deadline()).await.unwrap();

    // The server refused the message: flow over, entry dropped, quota
    // restored, and no PUBREL on the wire.
    assert!(store.is_empty());
    assert_eq!(client.send_quota().unwrap(), initial_quota);

    client.disconnect(deadline(), false).await.unwrap();
    assert!(matches!(read_packet(&mut broker).await, Packet::Disconnect(_)));
}

#[tokio::test]
async fn send_quota_blocks_until_ack_frees_a_slot() {
    let mut connack = connack_success();
    connack.properties.set_receive_maximum(1);
    let (client, mut broker) =
        connected_client(ClientOptions::new(), ConnectPacket::new("C"), connack).await;

    let first = PublishPacket::new("t", &b"1"[..])
        .with_qos(QoS::AtLeastOnce)
        .with_packet_id(1);
    client.publish(deadline(), first).await.unwrap();
    assert_eq!(client.send_quota(), Some(0));

    // A second QoS 1 publish must wait for the PUBACK of the first.
    let blocked = {
        let client = client.clone();
        tokio::spawn(async move {
            let second = PublishPacket::new("t", &b"2"[..])
                .with_qos(QoS::AtLeastOnce)
                .with_packet_id(2);
            client.publish(deadline(), second).await
        })
    };

    assert!(matches!(read_packet(&mut broker).await, Packet::Publish(_)));
    assert!(!blocked.is_finished());

    write_packet(&mut broker, &Packet::PubAck(PubAckPacket::new(1))).await;
    client.poll(deadline()).await.unwrap();

    blocked.await.unwrap().unwrap();
    let packet = read_packet(&mut broker).await;
    let Packet::Publish(second) = packet else {
        panic!("expected second PUBLISH, got {packet:?}");
    };
    assert_eq!(second.packet_id, Some(2));
    assert_eq!(client.send_quota(), Some(0));
}

#[tokio::test]
async fn inbound_qos1_is_acked_and_dispatched() {
    let (client, mut broker) = connected_client(
        ClientOptions::new(),
        ConnectPacket::new("C"),
        connack_success(),
    )
    .await;
    let mut events = client.create_event_channel(4);

    let publish = PublishPacket::new("news", &b"hello"[..])
        .with_qos(QoS::AtLeastOnce)
        .with_packet_id(12);
    write_packet(&mut broker, &Packet::Publish(publish)).await;
    client.poll(deadline()).await.unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.packet_type, PacketType::Publish);

    let packet = read_packet(&mut broker).await;
    let Packet::PubAck(puback) = packet else {
        panic!("expected PUBACK, got {packet:?}");
    };
    assert_eq!(puback.packet_id, 12);
    assert_eq!(client.receive_quota(), 65_535);
}

#[tokio::test]
async fn inbound_qos2_completes_on_pubrel() {
    let store = Arc::new(MemoryStore::new());
    let connect = ConnectPacket::new("C").with_receive_maximum(5);
    let (client, mut broker) = connected_client(
        ClientOptions::new().with_store(store.clone()),
        connect,
        connack_success(),
    )
    .await;
    let mut events = client.create_event_channel(8);

    let publish = PublishPacket::new("jobs", &b"run"[..])
        .with_qos(QoS::ExactlyOnce)
        .with_packet_id(5);
    write_packet(&mut broker, &Packet::Publish(publish)).await;
    client.poll(deadline()).await.unwrap();

    // Message dispatched once, PUBREC written, record persisted, quota
    // held.
    assert_eq!(events.recv().await.unwrap().packet_type, PacketType::Publish);
    assert!(matches!(read_packet(&mut broker).await, Packet::PubRec(_)));
    assert!(matches!(store.get(5), Ok(StoredPacket::PubRec(_))));
    assert_eq!(client.receive_quota(), 4);

    // A redelivery of the same identifier is re-acked, not re-dispatched.
    let redelivery = PublishPacket::new("jobs", &b"run"[..])
        .with_qos(QoS::ExactlyOnce)
        .with_packet_id(5)
        .with_dup(true);
    write_packet(&mut broker, &Packet::Publish(redelivery)).await;
    client.poll(deadline()).await.unwrap();
    assert!(matches!(read_packet(&mut broker).await, Packet::PubRec(_)));
    assert_eq!(client.receive_quota(), 4);

    write_packet(&mut broker, &Packet::PubRel(PubRelPacket::new(5))).await;
    client.poll(deadline()).await.unwrap();

    let packet = read_packet(&mut broker).await;
    let Packet::PubComp(pubcomp) = packet else {
        panic!("expected PUBCOMP, got {packet:?}");
    };
    assert_eq!(pubcomp.packet_id, 5);
    assert_eq!(pubcomp.reason_code, ReasonCode::Success);
    assert!(store.is_empty());
    assert_eq!(client.receive_quota(), 5);
}

#[tokio::test]
async fn receive_maximum_violation_disconnects_with_0x93() {
    let connect = ConnectPacket::new("C").with_receive_maximum(1);
    let (client, mut broker) =
        connected_client(ClientOptions::new(), connect, connack_success()).await;
    let mut events = client.create_event_channel(8);

    // First flow: a QoS 2 publish holds the single quota unit until its
    // PUBREL, which never comes.
    let first = PublishPacket::new("q", &b"1"[..])
        .with_qos(QoS::ExactlyOnce)
        .with_packet_id(1);
    write_packet(&mut broker, &Packet::Publish(first)).await;
    client.poll(deadline()).await.unwrap();
    assert!(matches!(read_packet(&mut broker).await, Packet::PubRec(_)));
    assert_eq!(client.receive_quota(), 0);

    // Second QoS>0 publish: decoded, then refused before any ack is
    // written.
    let second = PublishPacket::new("q", &b"2"[..])
        .with_qos(QoS::AtLeastOnce)
        .with_packet_id(2);
    write_packet(&mut broker, &Packet::Publish(second)).await;
    let result = client.poll(deadline()).await;
    assert!(matches!(result, Err(MqttError::ReceiveMaximumExceeded)));
    assert!(!client.is_connected());

    let packet = read_packet(&mut broker).await;
    let Packet::Disconnect(disconnect) = packet else {
        panic!("expected DISCONNECT, got {packet:?}");
    };
    assert_eq!(disconnect.reason_code, ReasonCode::ReceiveMaximumExceeded);

    // The publish event for the first flow was dispatched; the second
    // never was. The close emitted the disconnect event.
    assert_eq!(events.recv().await.unwrap().packet_type, PacketType::Publish);
    let event = events.recv().await.unwrap();
    assert_eq!(event.packet_type, PacketType::Disconnect);
}

#[tokio::test]
async fn persisted_entries_replay_in_send_order() {
    let store = Arc::new(MemoryStore::new());
    let (client, mut broker) = connected_client(
        ClientOptions::new().with_store(store.clone()),
        ConnectPacket::new("C"),
        connack_success(),
    )
    .await;

    for id in [11u16, 12, 13] {
        let publish = PublishPacket::new("ordered", id.to_be_bytes().to_vec())
            .with_qos(QoS::AtLeastOnce)
            .with_packet_id(id);
        client.publish(deadline(), publish).await.unwrap();
        assert!(matches!(read_packet(&mut broker).await, Packet::Publish(_)));
    }

    // The broker acked nothing: a reconnecting host replays the entries
    // in insertion order, which is the original send order.
    let order: Vec<u16> = store.entries().iter().map(|(id, _)| *id).collect();
    assert_eq!(order, vec![11, 12, 13]);

    let replayed: Vec<PublishPacket> = store
        .entries()
        .into_iter()
        .map(|(_, packet)| match packet {
            StoredPacket::Publish(p) => p.with_dup(true),
            StoredPacket::PubRec(_) => panic!("expected stored publishes"),
        })
        .collect();
    assert!(replayed.iter().all(|p| p.dup));
}

#[tokio::test]
async fn write_after_peer_close_kills_session() {
    let (client, broker) = connected_client(
        ClientOptions::new(),
        ConnectPacket::new("C"),
        connack_success(),
    )
    .await;
    drop(broker);

    // The duplex buffers writes, so push until the dead peer is noticed.
    let mut saw_error = false;
    for _ in 0..64 {
        let publish = PublishPacket::new("t", vec![0u8; 1024]);
        if client.publish(deadline(), publish).await.is_err() {
            saw_error = true;
            break;
        }
    }
    assert!(saw_error);
    assert!(!client.is_connected());
}
