//! Topic name, topic filter, and shared-subscription validation.

use crate::error::{MqttError, Result};
use crate::packet::subscribe::TopicFilter;

pub const SHARED_SUBSCRIPTION_PREFIX: &str = "$share/";

/// A concrete topic name: non-empty, wildcard-free, no NUL, at most
/// 65 535 bytes.
#[must_use]
pub fn is_valid_topic_name(topic: &str) -> bool {
    !topic.is_empty()
        && topic.len() <= u16::MAX as usize
        && !topic.contains(['+', '#', '\0'])
}

/// A subscription filter: non-empty, no NUL, wildcards only in the
/// placements the matcher accepts. Shared-subscription filters are
/// validated on their inner filter.
#[must_use]
pub fn is_valid_topic_filter(filter: &str) -> bool {
    if filter.is_empty() || filter.len() > u16::MAX as usize || filter.contains('\0') {
        return false;
    }

    if let Some((group, inner)) = split_shared_subscription(filter) {
        return !group.is_empty()
            && !group.contains(['+', '#', '/'])
            && is_valid_topic_filter(inner);
    }

    if let Some(pos) = filter.find('#') {
        if pos + 1 != filter.len() {
            return false;
        }
        if pos != 0 && filter.as_bytes()[pos - 1] != b'/' {
            return false;
        }
    }

    for (pos, _) in filter.match_indices('+') {
        let starts_level = pos == 0 || filter.as_bytes()[pos - 1] == b'/';
        let ends_level = pos + 1 == filter.len() || filter.as_bytes()[pos + 1] == b'/';
        if !starts_level || !ends_level {
            return false;
        }
    }

    true
}

/// Splits `$share/<group>/<filter>` into group and inner filter.
#[must_use]
pub fn split_shared_subscription(filter: &str) -> Option<(&str, &str)> {
    filter
        .strip_prefix(SHARED_SUBSCRIPTION_PREFIX)
        .and_then(|rest| rest.split_once('/'))
}

/// Validates one SUBSCRIBE entry. Within a shared subscription the
/// No Local option must be zero.
pub fn validate_subscription(entry: &TopicFilter) -> Result<()> {
    if !is_valid_topic_filter(&entry.filter) {
        return Err(MqttError::InvalidTopicFilter(entry.filter.clone()));
    }

    if split_shared_subscription(&entry.filter).is_some() && entry.options.no_local {
        return Err(MqttError::InvalidArgument(format!(
            "No Local must not be set on shared subscription {:?}",
            entry.filter
        )));
    }

    Ok(())
}
