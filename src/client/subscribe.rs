//! SUBSCRIBE / UNSUBSCRIBE request-response correlation.

use crate::error::{MqttError, Result};
use crate::events::EventChannelHandle;
use crate::packet::suback::SubAckPacket;
use crate::packet::subscribe::{SubscribePacket, TopicFilter};
use crate::packet::subscribe_options::SubscriptionOptions;
use crate::packet::unsubscribe::UnsubscribePacket;
use crate::packet::Packet;
use crate::time::Deadline;
use crate::types::QoS;
use crate::validation;

use super::Client;

use tokio::sync::oneshot;

/// One subscription request: a filter, its options, and optionally the
/// event channel that should receive matching publishes. When the SUBACK
/// accepts the filter the channel migrates from the general set to the
/// filter binding.
#[derive(Debug, Clone)]
pub struct Topic {
    pub filter: String,
    pub options: SubscriptionOptions,
    pub channel: Option<EventChannelHandle>,
}

impl Topic {
    #[must_use]
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            options: SubscriptionOptions::default(),
            channel: None,
        }
    }

    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.options.qos = qos;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: SubscriptionOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_channel(mut self, handle: EventChannelHandle) -> Self {
        self.channel = Some(handle);
        self
    }

    fn as_filter(&self) -> TopicFilter {
        TopicFilter {
            filter: self.filter.clone(),
            options: self.options,
        }
    }
}

impl Client {
    /// Subscribes to the given topics. The completion sink is registered
    /// under the packet identifier before the packet is written; the
    /// poll pump delivers the SUBACK to it. Accepted filters activate
    /// their bindings; the first refused filter surfaces as
    /// [`MqttError::ReasonCode`].
    pub async fn subscribe(&self, deadline: Deadline, topics: Vec<Topic>) -> Result<()> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }
        if topics.is_empty() {
            return Err(MqttError::InvalidArgument("empty topic list".to_string()));
        }

        let filters: Vec<TopicFilter> = topics.iter().map(Topic::as_filter).collect();
        for filter in &filters {
            validation::validate_subscription(filter)?;
        }

        let packet_id = self.packet_ids.allocate()?;
        let packet = SubscribePacket {
            packet_id,
            filters,
            properties: crate::protocol::v5::properties::Properties::default(),
        };

        let response = self
            .request_response(deadline, packet_id, Packet::Subscribe(packet))
            .await;
        let suback = match response {
            Ok(Packet::SubAck(suback)) => suback,
            Ok(other) => {
                return Err(MqttError::UnexpectedPacket(other.packet_type()));
            }
            Err(e) => return Err(e),
        };

        if suback.reason_codes.len() != topics.len() {
            return Err(MqttError::MalformedPacket(format!(
                "SUBACK carries {} reason codes for {} filters",
                suback.reason_codes.len(),
                topics.len()
            )));
        }

        // Activate every accepted binding first, then report the first
        // refusal.
        let mut first_failure = None;
        for (topic, code) in topics.iter().zip(&suback.reason_codes) {
            if let Some(granted) = SubAckPacket::granted_qos(*code) {
                tracing::debug!(filter = %topic.filter, ?granted, "subscription active");
                if let Some(handle) = topic.channel {
                    self.events.bind_filter(dispatch_filter(&topic.filter), handle);
                }
            } else if first_failure.is_none() {
                tracing::warn!(filter = %topic.filter, code = %code, "subscription refused");
                first_failure = Some(*code);
            }
        }

        match first_failure {
            Some(code) => Err(MqttError::ReasonCode(code)),
            None => Ok(()),
        }
    }

    /// Removes subscriptions. Bindings for the filters are destroyed on
    /// UNSUBACK.
    pub async fn unsubscribe(&self, deadline: Deadline, filters: Vec<String>) -> Result<()> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }
        if filters.is_empty() {
            return Err(MqttError::InvalidArgument("empty filter list".to_string()));
        }

        let packet_id = self.packet_ids.allocate()?;
        let packet = UnsubscribePacket::new(packet_id, filters.clone());

        let response = self
            .request_response(deadline, packet_id, Packet::Unsubscribe(packet))
            .await;
        let unsuback = match response {
            Ok(Packet::UnsubAck(unsuback)) => unsuback,
            Ok(other) => {
                return Err(MqttError::UnexpectedPacket(other.packet_type()));
            }
            Err(e) => return Err(e),
        };

        let mut first_failure = None;
        for (filter, code) in filters.iter().zip(&unsuback.reason_codes) {
            if code.is_error() {
                tracing::warn!(filter = %filter, code = %code, "unsubscribe refused");
                if first_failure.is_none() {
                    first_failure = Some(*code);
                }
            } else {
                self.events.unbind_filter(dispatch_filter(filter));
            }
        }

        match first_failure {
            Some(code) => Err(MqttError::ReasonCode(code)),
            None => Ok(()),
        }
    }

    /// Registers the one-shot completion sink, writes the request, and
    /// awaits the correlated reply under the deadline. The identifier is
    /// released on every exit path; an abandoned entry is also cleaned
    /// up so the pump does not deliver into the void.
    async fn request_response(
        &self,
        deadline: Deadline,
        packet_id: u16,
        packet: Packet,
    ) -> Result<Packet> {
        let (tx, rx) = oneshot::channel();
        self.pending_responses.lock().insert(packet_id, tx);

        if let Err(e) = self.write_packet_or_close(&packet, &deadline).await {
            self.pending_responses.lock().remove(&packet_id);
            self.packet_ids.release(packet_id);
            return Err(e);
        }

        let result = deadline
            .bound(async {
                rx.await.map_err(|_| {
                    // The sender was dropped: the session closed
                    // underneath us.
                    MqttError::ConnectionClosed
                })
            })
            .await;

        self.pending_responses.lock().remove(&packet_id);
        self.packet_ids.release(packet_id);
        result
    }
}

/// The key a subscription is bound (and torn down) under in the event
/// maps. The broker delivers shared-subscription messages under the
/// plain topic name, so the `$share/<group>/` wrapper is stripped and
/// the inner filter is what incoming topics are matched against.
fn dispatch_filter(filter: &str) -> &str {
    validation::split_shared_subscription(filter).map_or(filter, |(_, inner)| inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientOptions;

    fn disconnected_client() -> Client {
        let (stream, _peer) = tokio::io::duplex(256);
        Client::new(stream, ClientOptions::new())
    }

    #[tokio::test]
    async fn test_subscribe_requires_connection() {
        let client = disconnected_client();
        let result = client
            .subscribe(Deadline::none(), vec![Topic::new("a/b")])
            .await;
        assert!(matches!(result, Err(MqttError::NotConnected)));
    }

    #[tokio::test]
    async fn test_empty_topic_list_is_invalid_argument() {
        let client = disconnected_client();
        client.connected.store(true, std::sync::atomic::Ordering::SeqCst);

        let result = client.subscribe(Deadline::none(), vec![]).await;
        assert!(matches!(result, Err(MqttError::InvalidArgument(_))));

        let result = client.unsubscribe(Deadline::none(), vec![]).await;
        assert!(matches!(result, Err(MqttError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_invalid_filter_rejected_before_any_io() {
        let client = disconnected_client();
        client.connected.store(true, std::sync::atomic::Ordering::SeqCst);

        let result = client
            .subscribe(Deadline::none(), vec![Topic::new("bad/#/filter")])
            .await;
        assert!(matches!(result, Err(MqttError::InvalidTopicFilter(_))));
    }

    #[test]
    fn test_dispatch_filter_strips_share_wrapper() {
        assert_eq!(
            dispatch_filter("$share/team/sensors/+/temp"),
            "sensors/+/temp"
        );
        assert_eq!(dispatch_filter("sensors/+/temp"), "sensors/+/temp");
    }

    #[test]
    fn test_topic_builder() {
        let topic = Topic::new("sensors/+/temp").with_qos(QoS::AtLeastOnce);
        assert_eq!(topic.filter, "sensors/+/temp");
        assert_eq!(topic.options.qos, QoS::AtLeastOnce);
        assert!(topic.channel.is_none());
    }
}
