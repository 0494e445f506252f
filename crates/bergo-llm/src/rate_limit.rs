use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-model request spacing. One instance lives on the shared
/// [`crate::ClientFactory`]; every streamer waits its turn before issuing a
/// request for a rate-limited model identifier.
#[derive(Debug, Default)]
pub struct RateLimiter {
    last_request_at: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `interval_secs` have elapsed since the previous request
    /// for this identifier, then stamp the current time.
    pub async fn wait_turn(&self, identifier: &str, interval_secs: u64) {
        if interval_secs == 0 {
            return;
        }
        let required = Duration::from_secs(interval_secs);
        let wait = {
            let map = self
                .last_request_at
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            map.get(identifier).and_then(|last| {
                let elapsed = last.elapsed();
                (elapsed < required).then(|| required - elapsed)
            })
        };
        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }
        let mut map = self
            .last_request_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.insert(identifier.to_string(), Instant::now());
    }
}
