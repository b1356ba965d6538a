use crate::error::GatewayError;
use dashmap::DashMap;

/// Result of [`WindowStore::try_consume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumption {
    /// The request was counted; carries the count after increment.
    Consumed(u64),
    /// The window already holds `limit` requests. Nothing was counted.
    Exhausted,
}

/// Storage for fixed-window counters.
///
/// Implementations must make `try_consume` atomic per key: the limit check
/// and the increment happen under the same lock, so a record never exceeds
/// its limit.
pub trait WindowStore: Send + Sync {
    /// Look up or create the record for `key` and count one request if the
    /// window still has room.
    fn try_consume(
        &self,
        route_id: &str,
        key: &str,
        window_end: u64,
        limit: u64,
    ) -> Result<Consumption, GatewayError>;

    /// Drop every record whose window ended before `now`. Returns the number removed.
    fn evict_expired(&self, now: u64) -> Result<usize, GatewayError>;

    /// Drop every record belonging to `route_id`. Returns the number removed.
    fn remove_route(&self, route_id: &str) -> Result<usize, GatewayError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct WindowRecord {
    route_id: String,
    count: u64,
    window_end: u64,
}

/// In-process store. DashMap shards give per-key locking.
#[derive(Debug, Default)]
pub struct MemoryWindowStore {
    windows: DashMap<String, WindowRecord>,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WindowStore for MemoryWindowStore {
    fn try_consume(
        &self,
        route_id: &str,
        key: &str,
        window_end: u64,
        limit: u64,
    ) -> Result<Consumption, GatewayError> {
        // Fast path: existing key, no allocation.
        let mut record = match self.windows.get_mut(key) {
            Some(r) => r,
            None => self
                .windows
                .entry(key.to_string())
                .or_insert_with(|| WindowRecord {
                    route_id: route_id.to_string(),
                    count: 0,
                    window_end,
                }),
        };

        if record.count >= limit {
            return Ok(Consumption::Exhausted);
        }
        record.count += 1;
        Ok(Consumption::Consumed(record.count))
    }

    fn evict_expired(&self, now: u64) -> Result<usize, GatewayError> {
        let before = self.windows.len();
        self.windows.retain(|_, r| now <= r.window_end);
        Ok(before.saturating_sub(self.windows.len()))
    }

    fn remove_route(&self, route_id: &str) -> Result<usize, GatewayError> {
        let before = self.windows.len();
        self.windows.retain(|_, r| r.route_id != route_id);
        Ok(before.saturating_sub(self.windows.len()))
    }

    fn len(&self) -> usize {
        self.windows.len()
    }
}
