//! Short-lived seen-set of webhook delivery ids.
//!
//! Sits in front of the dispatcher so a re-delivered webhook inside the
//! window is acknowledged without being processed a second time.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// TTL-bounded record of delivery ids already accepted.
#[derive(Debug)]
pub struct DeliveryLedger {
    ttl: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl DeliveryLedger {
    /// A zero `ttl` disables de-duplication.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Record `delivery_id`, returning `false` if it was already seen
    /// within the window.
    pub fn first_delivery(&self, delivery_id: &str) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.retain(|_, at| now.duration_since(*at) < self.ttl);

        if seen.contains_key(delivery_id) {
            return false;
        }
        seen.insert(delivery_id.to_string(), now);
        true
    }

    /// Drop `delivery_id` so a later redelivery is accepted again.
    pub fn forget(&self, delivery_id: &str) {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(delivery_id);
    }

    /// Number of ids currently remembered.
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
