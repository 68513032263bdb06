//! Wildcard topic matching.
//!
//! `+` matches exactly one level; `#` matches any number of trailing
//! levels (including zero) and is only legal as the last character of the
//! filter, standing alone or preceded by `/`. Malformed filters never
//! match.

/// Matches a concrete topic against a subscription filter.
#[must_use]
pub fn matches(topic: &str, filter: &str) -> bool {
    // A '#' anywhere but the final position, or one not occupying a whole
    // level, makes the filter malformed.
    if let Some(pos) = filter.find('#') {
        if pos + 1 != filter.len() {
            return false;
        }
        if pos != 0 && filter.as_bytes()[pos - 1] != b'/' {
            return false;
        }
    }

    // '+' must occupy a full level: bounded by '/' or the filter's ends.
    for (pos, _) in filter.match_indices('+') {
        let starts_level = pos == 0 || filter.as_bytes()[pos - 1] == b'/';
        let ends_level = pos + 1 == filter.len() || filter.as_bytes()[pos + 1] == b'/';
        if !starts_level || !ends_level {
            return false;
        }
    }

    let mut topic_levels = topic.split('/');
    let mut filter_levels = filter.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            // Terminal '#' swallows the rest of the topic, zero levels
            // included.
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(expected), Some(level)) if expected == level => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
