//! Session bookkeeping shared between the client operations and the
//! packet pump.

pub mod flow_control;

use crate::packet::{ConnAckPacket, ConnectPacket};
use crate::types::QoS;

use std::collections::{HashMap, HashSet};
use tokio::time::{Duration, Instant};

/// Mutable session fields, guarded by the client's state lock.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    /// Negotiated keep-alive; the server's CONNACK value wins when
    /// non-zero. Zero disables keep-alive.
    pub keep_alive: Duration,
    /// Armed to `now + 2 * keep_alive` on CONNACK and every PINGRESP.
    pub ping_response_deadline: Option<Instant>,
    /// Remembered from CONNECT to validate a later DISCONNECT.
    pub session_expiry: u32,
    /// Server-advertised cap on our concurrent QoS>0 sends.
    pub server_receive_maximum: u16,
    /// Our advertised cap on concurrent QoS>0 receives.
    pub client_receive_maximum: u16,
    /// Remaining inbound quota; hitting zero forces a 0x93 disconnect.
    pub receive_quota: u16,
    /// Outbound QoS>0 publishes awaiting their terminal ack. Guarantees
    /// each send restores the send quota exactly once.
    pub outbound_in_flight: HashMap<u16, QoS>,
    /// Inbound QoS 2 publishes we have PUBREC'd but whose PUBREL has not
    /// arrived. A redelivery of one of these is re-acked, not
    /// re-dispatched.
    pub inbound_unreleased: HashSet<u16>,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adopts the negotiated parameters after a successful CONNACK.
    pub(crate) fn on_connack(&mut self, connect: &ConnectPacket, connack: &ConnAckPacket) {
        let keep_alive_secs = match connack.server_keep_alive() {
            Some(server) if server > 0 => server,
            _ => connect.keep_alive,
        };
        self.keep_alive = Duration::from_secs(u64::from(keep_alive_secs));
        self.session_expiry = connect.session_expiry();

        self.server_receive_maximum = connack.receive_maximum();
        let client_maximum = connect.receive_maximum();
        self.client_receive_maximum = if client_maximum == 0 {
            self.server_receive_maximum
        } else {
            client_maximum
        };
        self.receive_quota = self.client_receive_maximum;

        self.outbound_in_flight.clear();
        self.inbound_unreleased.clear();
        self.arm_ping_deadline();
    }

    /// Resets the ping-response deadline to `now + 2 * keep_alive`.
    pub(crate) fn arm_ping_deadline(&mut self) {
        if self.keep_alive.is_zero() {
            self.ping_response_deadline = None;
        } else {
            self.ping_response_deadline = Some(Instant::now() + 2 * self.keep_alive);
        }
    }

    pub(crate) fn ping_deadline_passed(&self) -> bool {
        self.ping_response_deadline
            .is_some_and(|deadline| Instant::now() > deadline)
    }

    /// Takes one unit of inbound quota; `false` means the quota was
    /// already exhausted and the publish must be refused with 0x93.
    pub(crate) fn take_receive_quota(&mut self) -> bool {
        if self.receive_quota == 0 {
            return false;
        }
        self.receive_quota -= 1;
        true
    }

    /// Restores one unit of inbound quota after the terminal ack is sent.
    pub(crate) fn restore_receive_quota(&mut self) {
        if self.receive_quota < self.client_receive_maximum {
            self.receive_quota += 1;
        }
    }
}
