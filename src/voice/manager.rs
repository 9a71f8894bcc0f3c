use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use super::{MediaConnection, VoiceClient, VoiceEvent};
use crate::{
    common::types::{GuildId, UserId},
    protocol::{OutgoingMessage, PlayerEvent},
    server::outbox::Outbox,
};

/// Per-session registry of voice connections, one per guild.
pub struct VoiceConnectionManager {
    client: Arc<dyn VoiceClient>,
    user_id: UserId,
    connections: DashMap<GuildId, Arc<dyn MediaConnection>>,
    outbox: Arc<Outbox>,
}

impl VoiceConnectionManager {
    pub fn new(client: Arc<dyn VoiceClient>, user_id: UserId, outbox: Arc<Outbox>) -> Self {
        Self {
            client,
            user_id,
            connections: DashMap::new(),
            outbox,
        }
    }

    /// Returns the guild's connection, creating it on first use.
    pub fn connection(&self, guild_id: &GuildId) -> Arc<dyn MediaConnection> {
        self.connections
            .entry(guild_id.clone())
            .or_insert_with(|| {
                debug!("[{}] Creating voice connection", guild_id);
                let (tx, rx) = flume::unbounded();
                self.spawn_forwarder(guild_id.clone(), rx);
                self.client.create_connection(guild_id, self.user_id, tx)
            })
            .clone()
    }

    pub fn existing(&self, guild_id: &GuildId) -> Option<Arc<dyn MediaConnection>> {
        self.connections.get(guild_id).map(|c| c.clone())
    }

    pub fn release(&self, guild_id: &GuildId) {
        if let Some((_, connection)) = self.connections.remove(guild_id) {
            info!("[{}] Releasing voice connection", guild_id);
            connection.close();
        }
    }

    pub fn release_all(&self) {
        let guilds: Vec<GuildId> = self.connections.iter().map(|e| e.key().clone()).collect();
        for guild_id in guilds {
            self.release(&guild_id);
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Relays transport close notifications into the session's event stream.
    /// Ends once the connection and its sender are dropped.
    fn spawn_forwarder(&self, guild_id: GuildId, events: flume::Receiver<VoiceEvent>) {
        let outbox = Arc::downgrade(&self.outbox);
        tokio::spawn(async move {
            while let Ok(event) = events.recv_async().await {
                let Some(outbox) = outbox.upgrade() else {
                    break;
                };
                let VoiceEvent::Closed {
                    code,
                    reason,
                    by_remote,
                } = event;
                outbox.send_message(&OutgoingMessage::Event {
                    event: PlayerEvent::WebSocketClosed {
                        guild_id: guild_id.clone(),
                        code,
                        reason,
                        by_remote,
                    },
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::Value;

    use super::*;
    use crate::voice::{FrameProvider, VoiceServerInfo};

    #[derive(Default)]
    struct StubClient {
        created: AtomicUsize,
    }

    struct StubConnection {
        events: flume::Sender<VoiceEvent>,
    }

    impl MediaConnection for StubConnection {
        fn connect(&self, _info: VoiceServerInfo) {}
        fn set_provider(&self, _provider: Option<Arc<dyn FrameProvider>>) {}
        fn is_connected(&self) -> bool {
            true
        }
        fn close(&self) {
            let _ = self.events.send(VoiceEvent::Closed {
                code: 4014,
                reason: "Disconnected".into(),
                by_remote: true,
            });
        }
    }

    impl VoiceClient for StubClient {
        fn create_connection(
            &self,
            _guild_id: &GuildId,
            _user_id: UserId,
            events: flume::Sender<VoiceEvent>,
        ) -> Arc<dyn MediaConnection> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Arc::new(StubConnection { events })
        }
    }

    fn manager() -> (Arc<StubClient>, VoiceConnectionManager, flume::Receiver<String>) {
        let (tx, rx) = flume::unbounded();
        let client = Arc::new(StubClient::default());
        let manager = VoiceConnectionManager::new(client.clone(), UserId(7), Arc::new(Outbox::new(tx)));
        (client, manager, rx)
    }

    #[tokio::test]
    async fn connection_is_created_once_per_guild() {
        let (client, manager, _rx) = manager();
        let a = manager.connection(&"1".into());
        let b = manager.connection(&"1".into());
        manager.connection(&"2".into());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(client.created.load(Ordering::SeqCst), 2);
        assert_eq!(manager.len(), 2);
    }

    #[tokio::test]
    async fn close_events_become_websocket_closed_events() {
        let (_client, manager, rx) = manager();
        manager.connection(&"5".into());
        manager.release(&"5".into());
        assert!(manager.existing(&"5".into()).is_none());

        let json = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv_async())
            .await
            .unwrap()
            .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["op"], "event");
        assert_eq!(value["type"], "WebSocketClosedEvent");
        assert_eq!(value["guildId"], "5");
        assert_eq!(value["code"], 4014);
        assert_eq!(value["byRemote"], true);
    }

    #[tokio::test]
    async fn release_all_empties_the_registry() {
        let (_client, manager, _rx) = manager();
        manager.connection(&"1".into());
        manager.connection(&"2".into());
        manager.release_all();
        assert!(manager.is_empty());
    }
}
