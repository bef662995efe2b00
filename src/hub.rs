use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::messages::WsMessage;

struct ClientHandle {
    tx: UnboundedSender<WsMessage>,
    connected_at: DateTime<Utc>,
    messages_sent: u64,
}

/// A registered subscriber: its id plus the receiving end of its outbound
/// channel. The transport task drains `rx` onto the wire; dropping it is
/// how a dead connection surfaces to the hub.
pub struct Subscription {
    pub client_id: Uuid,
    pub rx: UnboundedReceiver<WsMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientStats {
    pub client_id: Uuid,
    pub connected_at: DateTime<Utc>,
    pub messages_sent: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub active_connections: usize,
    pub total_messages_sent: u64,
    pub clients: Vec<ClientStats>,
}

/// Live subscriber registry with best-effort, at-most-once fan-out. The
/// registry is touched by the aggregation task (broadcast) and by every
/// connection's lifecycle, so it sits behind a mutex.
#[derive(Default)]
pub struct BroadcastHub {
    clients: Mutex<HashMap<Uuid, ClientHandle>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and queue its connection-established message.
    pub fn connect(&self) -> Subscription {
        let client_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let now = Utc::now();

        let handle = ClientHandle {
            tx,
            connected_at: now,
            messages_sent: 0,
        };
        let total = {
            let mut clients = self.clients.lock();
            clients.insert(client_id, handle);
            clients.len()
        };

        info!(client_id = %client_id, total_connections = total, "subscriber connected");
        self.send_to(client_id, WsMessage::connection(&client_id.to_string(), now));

        Subscription { client_id, rx }
    }

    /// Deregister a subscriber and log its final stats.
    pub fn disconnect(&self, client_id: Uuid) {
        let removed = self.clients.lock().remove(&client_id);
        if let Some(handle) = removed {
            info!(
                client_id = %client_id,
                messages_sent = handle.messages_sent,
                "subscriber disconnected"
            );
        }
    }

    /// Best-effort send to one subscriber. A failed send is logged and
    /// swallowed; cleanup happens on the next broadcast pass.
    pub fn send_to(&self, client_id: Uuid, message: WsMessage) -> bool {
        let mut clients = self.clients.lock();
        let Some(handle) = clients.get_mut(&client_id) else {
            return false;
        };
        match handle.tx.send(message) {
            Ok(()) => {
                handle.messages_sent += 1;
                true
            }
            Err(err) => {
                warn!(client_id = %client_id, "failed to send to subscriber: {err}");
                false
            }
        }
    }

    /// Fan a message out to every live subscriber not in `exclude`,
    /// deregistering any whose channel has gone away. Returns the number
    /// of subscribers the message was delivered to.
    pub fn broadcast(&self, message: &WsMessage, exclude: &[Uuid]) -> usize {
        let mut clients = self.clients.lock();
        let mut delivered = 0;
        let mut dead = Vec::new();

        for (client_id, handle) in clients.iter_mut() {
            if exclude.contains(client_id) {
                continue;
            }
            match handle.tx.send(message.clone()) {
                Ok(()) => {
                    handle.messages_sent += 1;
                    delivered += 1;
                }
                Err(_) => dead.push(*client_id),
            }
        }

        for client_id in dead {
            warn!(client_id = %client_id, "dropping dead subscriber");
            clients.remove(&client_id);
        }

        if delivered > 0 {
            debug!(
                message_type = message.kind(),
                recipients = delivered,
                "broadcast dispatched"
            );
        }
        delivered
    }

    pub fn is_connected(&self, client_id: Uuid) -> bool {
        self.clients.lock().contains_key(&client_id)
    }

    pub fn connection_count(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn stats(&self) -> HubStats {
        let clients = self.clients.lock();
        let mut stats: Vec<ClientStats> = clients
            .iter()
            .map(|(client_id, handle)| ClientStats {
                client_id: *client_id,
                connected_at: handle.connected_at,
                messages_sent: handle.messages_sent,
            })
            .collect();
        stats.sort_by_key(|client| client.connected_at);

        HubStats {
            active_connections: stats.len(),
            total_messages_sent: stats.iter().map(|client| client.messages_sent).sum(),
            clients: stats,
        }
    }
}
