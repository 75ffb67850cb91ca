use moka::sync::Cache;
use tokio::sync::mpsc::{error::TrySendError, Sender};
use tracing::{debug, info, warn};

/// Frames a connection may have queued before it is considered too slow.
pub const OUTBOX_CAPACITY: usize = 256;

/// What the hub knows about one live socket.
#[derive(Clone, Debug)]
pub struct ConnCtx {
    pub user_id: String,
    pub user_name: String,
    pub outbox: Sender<String>,
}

/// Live connections keyed by connection id.
///
/// Entries never expire on their own: a context leaves the cache only through
/// `remove`, which is what the disconnect path and the slow-consumer cut-off use.
pub struct ConnCtxCache {
    cache: Cache<String, ConnCtx>,
}

impl ConnCtxCache {
    pub fn new() -> Self {
        let cache = Cache::builder().build();
        info!("Connection context cache initialized");
        Self { cache }
    }

    pub fn insert(&self, connection_id: &str, ctx: ConnCtx) {
        self.cache.insert(connection_id.to_string(), ctx);
    }

    pub fn get(&self, connection_id: &str) -> Option<ConnCtx> {
        self.cache.get(connection_id)
    }

    pub fn remove(&self, connection_id: &str) -> Option<ConnCtx> {
        self.cache.remove(connection_id)
    }

    /// Queues a serialized message for one connection. Returns false if the
    /// connection is gone or its queue is full. A full queue drops the context,
    /// which closes the socket and runs the regular disconnect cleanup.
    pub fn send(&self, connection_id: &str, text: &str) -> bool {
        let Some(ctx) = self.cache.get(connection_id) else {
            debug!("No live connection {} to send to", connection_id);
            return false;
        };
        match ctx.outbox.try_send(text.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Outbound queue of connection {} (user {}) is full, dropping connection",
                    connection_id, ctx.user_id
                );
                self.cache.remove(connection_id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Connection {} already closed", connection_id);
                self.cache.remove(connection_id);
                false
            }
        }
    }

    pub fn connection_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl Default for ConnCtxCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{channel, error::TryRecvError};

    fn ctx(outbox: Sender<String>) -> ConnCtx {
        ConnCtx {
            user_id: "u1".to_string(),
            user_name: "Alice".to_string(),
            outbox,
        }
    }

    #[test]
    fn contexts_have_no_idle_or_capacity_eviction() {
        let connections = ConnCtxCache::new();
        let policy = connections.cache.policy();

        assert_eq!(policy.time_to_idle(), None);
        assert_eq!(policy.time_to_live(), None);
        assert_eq!(policy.max_capacity(), None);
    }

    #[test]
    fn full_outbox_drops_frame_and_connection() {
        let connections = ConnCtxCache::new();
        let (outbox, mut rx) = channel(1);
        connections.insert("conn-1", ctx(outbox));

        assert!(connections.send("conn-1", "first"));
        assert!(!connections.send("conn-1", "second"));
        assert!(connections.get("conn-1").is_none());

        assert_eq!(rx.try_recv().ok().as_deref(), Some("first"));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn closed_receiver_forgets_connection() {
        let connections = ConnCtxCache::new();
        let (outbox, rx) = channel(OUTBOX_CAPACITY);
        connections.insert("conn-1", ctx(outbox));
        drop(rx);

        assert!(!connections.send("conn-1", "hello"));
        assert!(connections.get("conn-1").is_none());
        assert!(!connections.send("conn-1", "hello"));
    }
}
