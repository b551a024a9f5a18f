//! Bounded memory of recently handled Slack event ids, so redeliveries of an
//! event that was already processed are acknowledged without relaying twice.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

/// Event ids kept by default; older ids are forgotten first.
pub const DEFAULT_CAPACITY: usize = 1024;

pub struct RecentEvents {
    capacity: usize,
    seen: Mutex<Seen>,
}

#[derive(Default)]
struct Seen {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl Default for RecentEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RecentEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            seen: Mutex::new(Seen::default()),
        }
    }

    /// Record `event_id`; true if it had not been seen before.
    pub fn first_delivery(&self, event_id: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if seen.ids.contains(event_id) {
            return false;
        }
        if seen.order.len() >= self.capacity {
            if let Some(oldest) = seen.order.pop_front() {
                seen.ids.remove(&oldest);
            }
        }
        seen.ids.insert(event_id.to_string());
        seen.order.push_back(event_id.to_string());
        true
    }
}
