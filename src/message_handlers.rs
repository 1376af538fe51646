//! Outstanding request tracking.
//!
//! Node requests carry a random 32-bit ID and are answered asynchronously,
//! possibly by a different node than the one the request was written to.
//! Each sent request registers a completion handler here; responses claim
//! the handler by ID, and the device manager's periodic tick fails any
//! handler that has waited too long so callers never hang on a lost frame.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// How long a request may remain unanswered before it fails.
pub const MESSAGE_TIMEOUT: Duration = Duration::from_secs(3);

/// Completion handler invoked with the response's success flag, or `false`
/// on timeout.
pub type ResponseHandler = Box<dyn FnOnce(bool) + Send>;

struct PendingMessage {
    sent_at: Instant,
    handler: ResponseHandler,
}

/// Registry of outstanding node requests.
#[derive(Default)]
pub struct MessageHandlers {
    pending: Mutex<HashMap<u32, PendingMessage>>,
}

impl MessageHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a sent request.
    pub fn add_handler(&self, request_id: u32, handler: ResponseHandler) {
        self.pending.lock().insert(
            request_id,
            PendingMessage {
                sent_at: Instant::now(),
                handler,
            },
        );
    }

    /// Complete the handler for a response. Returns false when no handler
    /// was registered for the ID, which happens for responses relayed to
    /// every connected node.
    pub fn handle_response(&self, request_id: u32, success: bool) -> bool {
        let pending = self.pending.lock().remove(&request_id);
        match pending {
            Some(message) => {
                (message.handler)(success);
                true
            }
            None => false,
        }
    }

    /// Fail and remove every handler older than [`MESSAGE_TIMEOUT`]. Called
    /// from the device manager's periodic tick.
    pub fn check_timeouts(&self) {
        let now = Instant::now();
        let expired: Vec<PendingMessage> = {
            let mut pending = self.pending.lock();
            let expired_ids: Vec<u32> = pending
                .iter()
                .filter(|(_, message)| now.duration_since(message.sent_at) >= MESSAGE_TIMEOUT)
                .map(|(id, _)| *id)
                .collect();
            expired_ids
                .into_iter()
                .filter_map(|id| {
                    debug!(request_id = id, "Request timed out");
                    pending.remove(&id)
                })
                .collect()
        };

        for message in expired {
            (message.handler)(false);
        }
    }

    /// Number of outstanding requests.
    pub fn outstanding(&self) -> usize {
        self.pending.lock().len()
    }
}
