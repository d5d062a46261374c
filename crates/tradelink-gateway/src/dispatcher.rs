use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use tradelink_types::events::RelayEvent;

/// Who receives a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayScope {
    /// Only the live connections of the accounts an event is addressed to
    #[default]
    Participants,
    /// Every connected client, regardless of addressing
    Global,
}

impl FromStr for RelayScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "participants" => Ok(RelayScope::Participants),
            "global" => Ok(RelayScope::Global),
            other => Err(format!("unknown relay scope '{}'", other)),
        }
    }
}

/// Registry of live relay connections, one per account.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    scope: RelayScope,

    /// Fan-out used in `Global` scope only
    broadcast_tx: broadcast::Sender<RelayEvent>,

    /// Per-account targeted channels: account_id -> (conn_id, sender)
    connections: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<RelayEvent>)>>,
}

impl Dispatcher {
    pub fn new(scope: RelayScope) -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                scope,
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn scope(&self) -> RelayScope {
        self.inner.scope
    }

    /// Subscribe to the global fan-out.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Bind a new connection to `account_id`, replacing any older one.
    /// Returns (conn_id, receiver).
    pub async fn register(&self, account_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<RelayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let replaced = self
            .inner
            .connections
            .write()
            .await
            .insert(account_id, (conn_id, tx));
        if replaced.is_some() {
            debug!("{} reconnected, replacing previous relay connection", account_id);
        }
        (conn_id, rx)
    }

    /// Release the binding, but only if `conn_id` still owns it.
    pub async fn unregister(&self, account_id: Uuid, conn_id: Uuid) {
        let mut connections = self.inner.connections.write().await;
        if let Some((stored_conn_id, _)) = connections.get(&account_id) {
            if *stored_conn_id == conn_id {
                connections.remove(&account_id);
            }
        }
    }

    /// Deliver an event about a conversation between `parties`. Best effort:
    /// absent connections are skipped and nothing is queued.
    pub async fn publish(&self, parties: &[Uuid], event: RelayEvent) {
        match self.inner.scope {
            RelayScope::Global => {
                let _ = self.inner.broadcast_tx.send(event);
            }
            RelayScope::Participants => {
                let connections = self.inner.connections.read().await;
                let mut delivered: Vec<Uuid> = Vec::with_capacity(parties.len());
                for party in parties {
                    if delivered.contains(party) {
                        continue;
                    }
                    delivered.push(*party);
                    if let Some((_, tx)) = connections.get(party) {
                        let _ = tx.send(event.clone());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    fn event() -> RelayEvent {
        RelayEvent::MessageDelete {
            message_id: Uuid::new_v4(),
            deleted_by: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn participants_scope_reaches_only_parties() {
        let dispatcher = Dispatcher::new(RelayScope::Participants);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (_, mut rx_a) = dispatcher.register(a).await;
        let (_, mut rx_b) = dispatcher.register(b).await;
        let (_, mut rx_c) = dispatcher.register(c).await;

        dispatcher.publish(&[a, b], event()).await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn duplicate_parties_receive_once() {
        let dispatcher = Dispatcher::new(RelayScope::Participants);
        let a = Uuid::new_v4();
        let (_, mut rx) = dispatcher.register(a).await;

        dispatcher.publish(&[a, a], event()).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn global_scope_uses_broadcast() {
        let dispatcher = Dispatcher::new(RelayScope::Global);
        let a = Uuid::new_v4();
        let (_, mut targeted) = dispatcher.register(a).await;
        let mut everyone = dispatcher.subscribe();

        dispatcher.publish(&[Uuid::new_v4()], event()).await;

        assert!(everyone.try_recv().is_ok());
        assert!(targeted.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_connection_does_not_evict_newer_one() {
        let dispatcher = Dispatcher::new(RelayScope::Participants);
        let a = Uuid::new_v4();
        let (old_conn, _old_rx) = dispatcher.register(a).await;
        let (_new_conn, mut new_rx) = dispatcher.register(a).await;

        dispatcher.unregister(a, old_conn).await;

        dispatcher.publish(&[a], event()).await;
        assert!(new_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unregister_releases_binding() {
        let dispatcher = Dispatcher::new(RelayScope::Participants);
        let a = Uuid::new_v4();
        let (conn, mut rx) = dispatcher.register(a).await;

        dispatcher.unregister(a, conn).await;
        dispatcher.publish(&[a], event()).await;

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[test]
    fn scope_parses_from_config() {
        assert_eq!("participants".parse::<RelayScope>().unwrap(), RelayScope::Participants);
        assert_eq!(" GLOBAL ".parse::<RelayScope>().unwrap(), RelayScope::Global);
        assert!("rooms".parse::<RelayScope>().is_err());
    }
}
