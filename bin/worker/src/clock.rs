use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, used for fault TTL and `last_seen`-style timestamps.
pub fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}
