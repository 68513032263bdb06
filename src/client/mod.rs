//! The client state machine.
//!
//! One [`Client`] drives one connection. The application calls the
//! operations (connect, subscribe, unsubscribe, publish, keep-alive,
//! disconnect) from its own tasks while a reader task drives [`Client::poll`]
//! in a loop. Shared state is partitioned by two locks: the transport
//! write lock serializes whole packets onto the wire, and the state lock
//! guards the session fields. A `publish` blocked on send quota is
//! released from the poll path, so `poll` must run on a different task
//! from any publisher that may block.

mod poll;
mod publish;
mod subscribe;

use crate::backoff;
use crate::error::{MqttError, Result};
use crate::events::{Event, EventBus, EventChannel, EventChannelHandle};
use crate::packet::{ConnectPacket, DisconnectPacket, Packet, PacketType};
use crate::packet_id::PacketIdAllocator;
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::session::flow_control::SendQuota;
use crate::session::SessionState;
use crate::store::PacketStore;
use crate::time::Deadline;
use crate::transport::{PacketReader, PacketWriter};

use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::time::Duration;

pub use subscribe::Topic;

const DEFAULT_BODY_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Host-side configuration: the persistence store, the packet-identifier
/// random source, and the extended deadline used to finish reading a
/// packet whose header has arrived.
pub struct ClientOptions {
    store: Option<Arc<dyn PacketStore>>,
    packet_ids: PacketIdAllocator,
    body_read_timeout: Duration,
}

impl ClientOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: None,
            packet_ids: PacketIdAllocator::new(),
            body_read_timeout: DEFAULT_BODY_READ_TIMEOUT,
        }
    }

    /// Persist unacknowledged QoS>0 flows in `store` so a reconnecting
    /// host can replay them.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn PacketStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the packet-identifier random source (the low 16 bits of
    /// each draw are used).
    #[must_use]
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.packet_ids = PacketIdAllocator::with_rng(rng);
        self
    }

    #[must_use]
    pub fn with_body_read_timeout(mut self, timeout: Duration) -> Self {
        self.body_read_timeout = timeout;
        self
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// A single-connection MQTT 5 protocol engine over a connected byte
/// stream.
pub struct Client {
    pub(crate) reader: AsyncMutex<PacketReader>,
    /// Transport write lock: no two packets interleave on the wire.
    pub(crate) writer: AsyncMutex<PacketWriter>,
    /// State lock over the mutable session fields.
    pub(crate) state: Mutex<SessionState>,
    pub(crate) connected: AtomicBool,
    closed: AtomicBool,
    pub(crate) send_quota: Mutex<Option<SendQuota>>,
    /// One-shot completion sinks keyed by packet identifier, correlating
    /// SUBACK/UNSUBACK with their requests.
    pub(crate) pending_responses: Mutex<HashMap<u16, oneshot::Sender<Packet>>>,
    pub(crate) packet_ids: PacketIdAllocator,
    pub(crate) events: EventBus,
    pub(crate) store: Option<Arc<dyn PacketStore>>,
    pub(crate) body_read_timeout: Duration,
}

impl Client {
    /// Wraps an already-connected duplex byte stream.
    pub fn new<S>(stream: S, options: ClientOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: AsyncMutex::new(PacketReader::new(Box::new(read_half))),
            writer: AsyncMutex::new(PacketWriter::new(Box::new(write_half))),
            state: Mutex::new(SessionState::new()),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            send_quota: Mutex::new(None),
            pending_responses: Mutex::new(HashMap::new()),
            packet_ids: options.packet_ids,
            events: EventBus::new(),
            store: options.store,
            body_read_timeout: options.body_read_timeout,
        }
    }

    /// Sends CONNECT and waits for the CONNACK under the deadline. A
    /// broker reason of 0x80 or greater closes the transport and surfaces
    /// as [`MqttError::ReasonCode`].
    pub async fn connect(&self, deadline: Deadline, packet: ConnectPacket) -> Result<()> {
        if self.is_connected() {
            return Err(MqttError::AlreadyConnected);
        }

        self.writer
            .lock()
            .await
            .write_packet(&Packet::Connect(Box::new(packet.clone())), &deadline)
            .await?;

        tracing::debug!(client_id = %packet.client_id, "CONNECT sent, waiting for CONNACK");

        // A transient EOF here means the broker has not replied yet;
        // retry with backoff until the deadline.
        let reply = backoff::retry(deadline, || async move {
            self.reader.lock().await.read_packet(&deadline).await
        })
        .await?;

        let connack = match reply {
            Packet::ConnAck(connack) => connack,
            other => {
                let _ = self.writer.lock().await.shutdown().await;
                return Err(MqttError::UnexpectedPacket(other.packet_type()));
            }
        };

        if connack.reason_code.is_error() {
            // The server closes after an error CONNACK; close our side
            // and report the reason.
            let _ = self.writer.lock().await.shutdown().await;
            return Err(MqttError::ReasonCode(connack.reason_code));
        }

        {
            let mut state = self.state.lock();
            state.on_connack(&packet, &connack);
            *self.send_quota.lock() = Some(SendQuota::new(state.server_receive_maximum));
            tracing::debug!(
                keep_alive_secs = state.keep_alive.as_secs(),
                server_receive_maximum = state.server_receive_maximum,
                client_receive_maximum = state.client_receive_maximum,
                session_present = connack.session_present,
                "connected"
            );
        }
        self.connected.store(true, Ordering::SeqCst);

        self.events
            .signal(PacketType::ConnAck, Some(Packet::ConnAck(connack)));
        Ok(())
    }

    /// Sends DISCONNECT and closes the transport. `publish_will` asks the
    /// server to publish the will message (reason 0x04). The session
    /// expiry from CONNECT is kept.
    pub async fn disconnect(&self, deadline: Deadline, publish_will: bool) -> Result<()> {
        self.disconnect_with_session_expiry(deadline, publish_will, 0)
            .await
    }

    /// Like [`Client::disconnect`], overriding the session expiry. When
    /// the CONNECT session expiry was zero a non-zero value here is a
    /// protocol error and is forced to zero on the wire.
    pub async fn disconnect_with_session_expiry(
        &self,
        deadline: Deadline,
        publish_will: bool,
        session_expiry_seconds: u32,
    ) -> Result<()> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }

        let mut packet = if publish_will {
            DisconnectPacket::new(ReasonCode::DisconnectWithWillMessage)
        } else {
            DisconnectPacket::default()
        };

        let connect_expiry = self.state.lock().session_expiry;
        if session_expiry_seconds != 0 {
            if connect_expiry == 0 {
                tracing::warn!(
                    "session expiry was zero in CONNECT; ignoring non-zero DISCONNECT expiry"
                );
            } else {
                packet = packet.with_session_expiry(session_expiry_seconds);
            }
        }

        let event = Packet::Disconnect(packet.clone());
        self.shutdown_session(Some(packet), Some(event), &deadline)
            .await;
        Ok(())
    }

    /// Writes PINGREQ and returns immediately; the PINGRESP is observed
    /// by the poll pump, which resets the ping-response deadline.
    pub async fn keep_alive(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }

        // The broker drops us after 1.5 keep-alive intervals of silence;
        // there is no point writing for longer than that.
        let keep_alive = self.keep_alive_interval();
        let deadline = if keep_alive.is_zero() {
            Deadline::none()
        } else {
            Deadline::after(keep_alive + keep_alive / 2)
        };

        tracing::trace!("sending PINGREQ");
        self.write_packet_or_close(&Packet::PingReq, &deadline).await
    }

    /// Registers a bounded event sink. Delivery is non-blocking: a full
    /// sink misses events.
    pub fn create_event_channel(&self, capacity: usize) -> EventChannel {
        self.events.create_channel(capacity)
    }

    /// Removes the sink from the general set and any filter bindings; the
    /// receiver observes closure.
    pub fn close_event_channel(&self, handle: EventChannelHandle) {
        self.events.close_channel(handle);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// The negotiated keep-alive interval (the server's CONNACK value
    /// when it provided one).
    #[must_use]
    pub fn keep_alive_interval(&self) -> Duration {
        self.state.lock().keep_alive
    }

    /// Remaining send quota, observable once connected.
    #[must_use]
    pub fn send_quota(&self) -> Option<usize> {
        self.send_quota.lock().as_ref().map(SendQuota::available)
    }

    /// Remaining receive quota.
    #[must_use]
    pub fn receive_quota(&self) -> u16 {
        self.state.lock().receive_quota
    }

    /// Exactly-once close path: optional DISCONNECT write, transport
    /// close, `connected := false`, pending waiters failed, disconnect
    /// event (synthetic when `event_packet` is `None`).
    pub(crate) async fn shutdown_session(
        &self,
        send: Option<DisconnectPacket>,
        event_packet: Option<Packet>,
        deadline: &Deadline,
    ) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(packet) = send {
            let result = self
                .writer
                .lock()
                .await
                .write_packet(&Packet::Disconnect(packet), deadline)
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to write DISCONNECT before close");
            }
        }

        if let Err(e) = self.writer.lock().await.shutdown().await {
            tracing::debug!(error = %e, "transport close reported an error");
        }

        self.connected.store(false, Ordering::SeqCst);

        // Dropping the senders wakes every operation awaiting a
        // response; they observe a closed channel.
        self.pending_responses.lock().clear();

        tracing::debug!(synthetic = event_packet.is_none(), "session closed");
        self.events.signal(PacketType::Disconnect, event_packet);
    }

    /// Post-connect write helper. A failed write (other than a deadline
    /// expiry, which is transient) kills the session.
    pub(crate) async fn write_packet_or_close(
        &self,
        packet: &Packet,
        deadline: &Deadline,
    ) -> Result<()> {
        let result = {
            self.writer
                .lock()
                .await
                .write_packet(packet, deadline)
                .await
        };

        match result {
            Ok(()) => Ok(()),
            Err(MqttError::Timeout) => Err(MqttError::Timeout),
            Err(e) => {
                tracing::error!(error = %e, packet_type = ?packet.packet_type(), "write failed, closing session");
                self.shutdown_session(None, None, &Deadline::after(Duration::from_secs(1)))
                    .await;
                Err(e)
            }
        }
    }

    /// Delivers a correlated response to the operation waiting on this
    /// packet identifier. Returns the packet back when nobody waits.
    pub(crate) fn complete_pending(&self, packet_id: u16, packet: Packet) -> Option<Packet> {
        match self.pending_responses.lock().remove(&packet_id) {
            Some(tx) => {
                // A send error only means the waiter gave up (deadline);
                // the entry is gone either way.
                let _ = tx.send(packet);
                None
            }
            None => Some(packet),
        }
    }

    pub(crate) fn signal_event(&self, packet_type: PacketType, packet: Option<Packet>) {
        self.events.signal(packet_type, packet);
    }
}

/// Re-exported so hosts can consume events without importing the module.
pub type ClientEvent = Event;

#[cfg(test)]
mod tests {
    use super::*;

    fn disconnected_client() -> Client {
        let (stream, _peer) = tokio::io::duplex(256);
        Client::new(stream, ClientOptions::new())
    }

    #[tokio::test]
    async fn test_new_client_is_disconnected() {
        let client = disconnected_client();
        assert!(!client.is_connected());
        assert_eq!(client.keep_alive_interval(), Duration::ZERO);
        assert_eq!(client.send_quota(), None);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let client = disconnected_client();

        assert!(matches!(
            client.disconnect(Deadline::none(), false).await,
            Err(MqttError::NotConnected)
        ));
        assert!(matches!(
            client.keep_alive().await,
            Err(MqttError::NotConnected)
        ));
        assert!(matches!(
            client.poll(Deadline::none()).await,
            Err(MqttError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_event_channel_lifecycle() {
        let client = disconnected_client();
        let channel = client.create_event_channel(4);
        let handle = channel.handle();

        client.signal_event(PacketType::PingResp, Some(Packet::PingResp));
        let mut channel = channel;
        assert!(channel.try_recv().is_some());

        client.close_event_channel(handle);
        client.signal_event(PacketType::PingResp, Some(Packet::PingResp));
        assert!(channel.try_recv().is_none());
    }
}
