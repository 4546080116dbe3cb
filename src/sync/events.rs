//! Section-changed notifications.
//!
//! The reconciler never renders anything. It publishes a [`SectionChanged`]
//! event whenever a section collection is persisted with different content,
//! and front ends subscribe to redraw.

use std::collections::HashMap;

use tokio::sync::broadcast;

use crate::model::{Section, Ticket};
use crate::sync::hash::{content_hash, has_changed};

const CHANNEL_CAPACITY: usize = 64;

/// A section collection was replaced with different content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionChanged {
    pub section: Section,
    /// Records in the new collection.
    pub count: usize,
    /// Content hash of the new collection.
    pub hash: String,
}

/// Publishes [`SectionChanged`] events, suppressing unchanged content.
#[derive(Debug)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<SectionChanged>,
    last: HashMap<Section, String>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            last: HashMap::new(),
        }
    }

    /// New receiver. Lagging receivers skip missed events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SectionChanged> {
        self.sender.subscribe()
    }

    /// Publish if the collection differs from the last one published.
    ///
    /// Returns whether an event was emitted.
    pub fn publish(&mut self, section: Section, tickets: &[Ticket]) -> bool {
        let hash = content_hash(&tickets);
        if !has_changed(&hash, self.last.get(&section).map(String::as_str)) {
            return false;
        }
        self.last.insert(section, hash.clone());
        // No subscribers is fine.
        let _ = self.sender.send(SectionChanged {
            section,
            count: tickets.len(),
            hash,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_only_on_change() {
        let mut notifier = ChangeNotifier::new();
        let mut rx = notifier.subscribe();
        let tickets = vec![Ticket::new(Section::Ce).with("caseNumber", "CE-1")];

        assert!(notifier.publish(Section::Ce, &tickets));
        assert!(!notifier.publish(Section::Ce, &tickets));
        assert!(notifier.publish(Section::Cctv, &tickets));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.section, Section::Ce);
        assert_eq!(first.count, 1);
        assert_eq!(rx.try_recv().unwrap().section, Section::Cctv);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let mut notifier = ChangeNotifier::new();
        assert!(notifier.publish(Section::Ce, &[]));
    }
}
