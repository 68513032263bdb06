//! Typed accessors for the properties the client core reads and writes.

use super::{Properties, PropertyId, PropertyValue};

use bytes::Bytes;

macro_rules! getter {
    ($name:ident, $id:ident, $variant:ident, $ty:ty) => {
        #[must_use]
        pub fn $name(&self) -> Option<$ty> {
            match self.get(PropertyId::$id) {
                Some(PropertyValue::$variant(v)) => Some(*v),
                _ => None,
            }
        }
    };
}

macro_rules! string_getter {
    ($name:ident, $id:ident) => {
        #[must_use]
        pub fn $name(&self) -> Option<&str> {
            match self.get(PropertyId::$id) {
                Some(PropertyValue::Utf8String(v)) => Some(v.as_str()),
                _ => None,
            }
        }
    };
}

impl Properties {
    getter!(get_session_expiry_interval, SessionExpiryInterval, FourByteInteger, u32);
    getter!(get_receive_maximum, ReceiveMaximum, TwoByteInteger, u16);
    getter!(get_maximum_packet_size, MaximumPacketSize, FourByteInteger, u32);
    getter!(get_topic_alias_maximum, TopicAliasMaximum, TwoByteInteger, u16);
    getter!(get_topic_alias, TopicAlias, TwoByteInteger, u16);
    getter!(get_server_keep_alive, ServerKeepAlive, TwoByteInteger, u16);
    getter!(get_maximum_qos, MaximumQoS, Byte, u8);
    getter!(get_message_expiry_interval, MessageExpiryInterval, FourByteInteger, u32);
    getter!(get_will_delay_interval, WillDelayInterval, FourByteInteger, u32);

    string_getter!(get_assigned_client_identifier, AssignedClientIdentifier);
    string_getter!(get_reason_string, ReasonString);
    string_getter!(get_response_information, ResponseInformation);
    string_getter!(get_server_reference, ServerReference);
    string_getter!(get_authentication_method, AuthenticationMethod);
    string_getter!(get_content_type, ContentType);
    string_getter!(get_response_topic, ResponseTopic);

    #[must_use]
    pub fn get_retain_available(&self) -> Option<bool> {
        match self.get(PropertyId::RetainAvailable) {
            Some(PropertyValue::Byte(v)) => Some(*v != 0),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_wildcard_subscription_available(&self) -> Option<bool> {
        match self.get(PropertyId::WildcardSubscriptionAvailable) {
            Some(PropertyValue::Byte(v)) => Some(*v != 0),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_shared_subscription_available(&self) -> Option<bool> {
        match self.get(PropertyId::SharedSubscriptionAvailable) {
            Some(PropertyValue::Byte(v)) => Some(*v != 0),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_subscription_identifier_available(&self) -> Option<bool> {
        match self.get(PropertyId::SubscriptionIdentifierAvailable) {
            Some(PropertyValue::Byte(v)) => Some(*v != 0),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_authentication_data(&self) -> Option<&Bytes> {
        match self.get(PropertyId::AuthenticationData) {
            Some(PropertyValue::BinaryData(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_correlation_data(&self) -> Option<&Bytes> {
        match self.get(PropertyId::CorrelationData) {
            Some(PropertyValue::BinaryData(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn user_properties(&self) -> Vec<(&str, &str)> {
        self.get_all(PropertyId::UserProperty)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| match v {
                        PropertyValue::Utf8StringPair(k, v) => Some((k.as_str(), v.as_str())),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_session_expiry_interval(&mut self, seconds: u32) {
        self.replace(
            PropertyId::SessionExpiryInterval,
            PropertyValue::FourByteInteger(seconds),
        );
    }

    pub fn set_receive_maximum(&mut self, value: u16) {
        self.replace(PropertyId::ReceiveMaximum, PropertyValue::TwoByteInteger(value));
    }

    pub fn set_maximum_packet_size(&mut self, value: u32) {
        self.replace(
            PropertyId::MaximumPacketSize,
            PropertyValue::FourByteInteger(value),
        );
    }

    pub fn set_topic_alias_maximum(&mut self, value: u16) {
        self.replace(
            PropertyId::TopicAliasMaximum,
            PropertyValue::TwoByteInteger(value),
        );
    }

    pub fn set_request_response_information(&mut self, on: bool) {
        self.replace(
            PropertyId::RequestResponseInformation,
            PropertyValue::Byte(u8::from(on)),
        );
    }

    pub fn set_request_problem_information(&mut self, on: bool) {
        self.replace(
            PropertyId::RequestProblemInformation,
            PropertyValue::Byte(u8::from(on)),
        );
    }

    pub fn set_message_expiry_interval(&mut self, seconds: u32) {
        self.replace(
            PropertyId::MessageExpiryInterval,
            PropertyValue::FourByteInteger(seconds),
        );
    }

    pub fn set_will_delay_interval(&mut self, seconds: u32) {
        self.replace(
            PropertyId::WillDelayInterval,
            PropertyValue::FourByteInteger(seconds),
        );
    }

    pub fn set_payload_format_indicator(&mut self, is_utf8: bool) {
        self.replace(
            PropertyId::PayloadFormatIndicator,
            PropertyValue::Byte(u8::from(is_utf8)),
        );
    }

    pub fn set_content_type(&mut self, content_type: String) {
        self.replace(PropertyId::ContentType, PropertyValue::Utf8String(content_type));
    }

    pub fn set_response_topic(&mut self, topic: String) {
        self.replace(PropertyId::ResponseTopic, PropertyValue::Utf8String(topic));
    }

    pub fn set_correlation_data(&mut self, data: Bytes) {
        self.replace(PropertyId::CorrelationData, PropertyValue::BinaryData(data));
    }

    pub fn set_reason_string(&mut self, reason: String) {
        self.replace(PropertyId::ReasonString, PropertyValue::Utf8String(reason));
    }

    pub fn set_authentication_method(&mut self, method: String) {
        self.replace(
            PropertyId::AuthenticationMethod,
            PropertyValue::Utf8String(method),
        );
    }

    pub fn set_authentication_data(&mut self, data: Bytes) {
        self.replace(PropertyId::AuthenticationData, PropertyValue::BinaryData(data));
    }

    pub fn set_subscription_identifier(&mut self, id: u32) {
        self.properties
            .entry(PropertyId::SubscriptionIdentifier)
            .or_default()
            .push(PropertyValue::VariableByteInteger(id));
    }

    pub fn add_user_property(&mut self, key: String, value: String) {
        self.properties
            .entry(PropertyId::UserProperty)
            .or_default()
            .push(PropertyValue::Utf8StringPair(key, value));
    }

    fn replace(&mut self, id: PropertyId, value: PropertyValue) {
        self.properties.insert(id, vec![value]);
    }
}
