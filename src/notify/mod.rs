//! Notification event bus
//!
//! Publishes lifecycle events for the external Notification Dispatcher.
//! Events go to NATS when a connection is configured and always to a
//! local broadcast channel so in-process consumers (and tests) can
//! observe emissions without a NATS server.

pub mod events;
pub mod nats;

use tokio::sync::broadcast;
use tracing::{debug, warn};

pub use events::{NotificationEvent, EVENT_SUBJECT_PREFIX};
pub use nats::NatsClient;

/// Local broadcast buffer; events beyond this are dropped for slow
/// in-process subscribers (NATS delivery is unaffected)
const LOCAL_CHANNEL_CAPACITY: usize = 256;

/// Event bus shared by the provisioner and the lifecycle engine
pub struct EventBus {
    nats: Option<NatsClient>,
    local: broadcast::Sender<NotificationEvent>,
}

impl EventBus {
    /// Create an event bus, optionally backed by NATS
    pub fn new(nats: Option<NatsClient>) -> Self {
        let (local, _) = broadcast::channel(LOCAL_CHANNEL_CAPACITY);
        Self { nats, local }
    }

    /// Emit an event.
    ///
    /// Best-effort: delivery failures are logged, never propagated —
    /// an undeliverable notification must not fail the write that
    /// produced it.
    pub async fn emit(&self, event: NotificationEvent) {
        debug!(kind = event.kind(), "Emitting notification event");

        if let Some(ref nats) = self.nats {
            match event.to_bytes() {
                Ok(payload) => {
                    if let Err(e) = nats.publish(&event.subject(), payload).await {
                        warn!(kind = event.kind(), "Event publish failed: {}", e);
                    }
                }
                Err(e) => {
                    warn!(kind = event.kind(), "Event serialization failed: {}", e);
                }
            }
        }

        // Receiver-less send is fine; nobody is listening locally
        let _ = self.local.send(event);
    }

    /// Subscribe to the local event stream
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.local.subscribe()
    }
}
