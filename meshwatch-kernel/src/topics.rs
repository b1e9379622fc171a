/**
 * TOPIC ROUTER - Classification of inbound MQTT topics
 *
 * ROLE: maps a topic to one of the event kinds handled by the kernel.
 * A topic is split on '/' and the first segment found in TOPIC_TABLE wins.
 * Everything else is Unrecognized: the broker may carry topics we do not
 * care about, they are dropped without error.
 */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Node,
    Message,
    /// Classified but not processed yet.
    Device,
    Unrecognized,
}

pub const TOPIC_TABLE: &[(&str, EventKind)] = &[
    ("nodes", EventKind::Node),
    ("messages", EventKind::Message),
    ("device", EventKind::Device),
];

/// Default subscriptions, one per routed segment.
pub const DEFAULT_TOPICS: &[&str] = &[
    "meshtastic/nodes/#",
    "meshtastic/messages/#",
    "meshtastic/device/#",
];

pub fn classify(topic: &str) -> EventKind {
    topic
        .split('/')
        .find_map(|segment| {
            TOPIC_TABLE
                .iter()
                .find(|(name, _)| *name == segment)
                .map(|(_, kind)| *kind)
        })
        .unwrap_or(EventKind::Unrecognized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_segments() {
        assert_eq!(classify("meshtastic/nodes/abc"), EventKind::Node);
        assert_eq!(classify("meshtastic/messages/xyz"), EventKind::Message);
        assert_eq!(classify("meshtastic/device/radio0"), EventKind::Device);
        assert_eq!(classify("nodes"), EventKind::Node);
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(classify("meshtastic/unknown/thing"), EventKind::Unrecognized);
        assert_eq!(classify(""), EventKind::Unrecognized);
        // segment match, not substring
        assert_eq!(classify("meshtastic/mynodes/abc"), EventKind::Unrecognized);
        assert_eq!(classify("meshtastic/devices/abc"), EventKind::Unrecognized);
    }

    #[test]
    fn test_first_matching_segment_wins() {
        assert_eq!(classify("mesh/messages/nodes"), EventKind::Message);
        assert_eq!(classify("mesh/nodes/messages"), EventKind::Node);
    }

    #[test]
    fn test_default_topics_are_routed() {
        assert_eq!(classify(DEFAULT_TOPICS[0]), EventKind::Node);
        assert_eq!(classify(DEFAULT_TOPICS[1]), EventKind::Message);
        assert_eq!(classify(DEFAULT_TOPICS[2]), EventKind::Device);
    }
}
