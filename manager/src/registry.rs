//! Manager state: the live-server registry and client routing table
//! (spec §4.4). Mutated under a single lock distinct from the
//! coordination mutex that serializes Put/Del (spec §5) so that
//! registration, routing, and the heartbeat loop's snapshot never block
//! behind an in-flight two-phase write.

use std::collections::HashMap;

use async_std::sync::Mutex;
use rand::Rng;

#[derive(Clone, Debug)]
pub struct ServerNode {
    pub host: String,
    pub port: u16,
}

impl ServerNode {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Default)]
struct Inner {
    servers: HashMap<u32, ServerNode>,
    clients: HashMap<u32, String>,
}

#[derive(Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh positive id not already in use in `used`.
    fn fresh_id(used: &HashMap<u32, impl Sized>) -> u32 {
        let mut rng = rand::thread_rng();
        loop {
            let candidate = rng.gen_range(1..=i32::MAX as u32);
            if !used.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    pub async fn register_server(&self, host: String, port: u16) -> u32 {
        let mut inner = self.inner.lock().await;
        let id = Self::fresh_id(&inner.servers);
        inner.servers.insert(id, ServerNode { host, port });
        id
    }

    pub async fn deregister_server(&self, server_id: u32) {
        self.inner.lock().await.servers.remove(&server_id);
    }

    pub async fn is_registered(&self, server_id: u32) -> bool {
        self.inner.lock().await.servers.contains_key(&server_id)
    }

    /// Snapshot of all currently-registered servers, for quorum reads,
    /// two-phase commit fan-out, and the heartbeat loop. Cloning avoids
    /// holding the registry lock across network calls.
    pub async fn snapshot_servers(&self) -> Vec<(u32, ServerNode)> {
        self.inner
            .lock()
            .await
            .servers
            .iter()
            .map(|(id, node)| (*id, node.clone()))
            .collect()
    }

    pub async fn random_server(&self) -> Option<(u32, ServerNode)> {
        let inner = self.inner.lock().await;
        if inner.servers.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..inner.servers.len());
        inner.servers.iter().nth(idx).map(|(id, node)| (*id, node.clone()))
    }

    pub async fn endpoint_exists(&self, endpoint: &str) -> bool {
        self.inner
            .lock()
            .await
            .servers
            .values()
            .any(|node| node.endpoint() == endpoint)
    }

    pub async fn register_client(&self, endpoint: String) -> u32 {
        let mut inner = self.inner.lock().await;
        let id = Self::fresh_id(&inner.clients);
        inner.clients.insert(id, endpoint);
        id
    }

    pub async fn route_client(&self, client_id: u32, endpoint: String) {
        self.inner.lock().await.clients.insert(client_id, endpoint);
    }

    pub async fn deregister_client(&self, client_id: u32) {
        self.inner.lock().await.clients.remove(&client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[async_std::test]
    async fn register_and_deregister_server() {
        let registry = Registry::new();
        let id = registry.register_server("localhost".to_string(), 50051).await;
        assert!(registry.is_registered(id).await);

        registry.deregister_server(id).await;
        assert!(!registry.is_registered(id).await);
    }

    #[async_std::test]
    async fn endpoint_exists_reflects_registered_servers() {
        let registry = Registry::new();
        registry.register_server("localhost".to_string(), 50051).await;
        assert!(registry.endpoint_exists("localhost:50051").await);
        assert!(!registry.endpoint_exists("localhost:50052").await);
    }

    #[async_std::test]
    async fn random_server_none_when_empty() {
        let registry = Registry::new();
        assert!(registry.random_server().await.is_none());

        registry.register_server("localhost".to_string(), 50051).await;
        assert!(registry.random_server().await.is_some());
    }

    #[async_std::test]
    async fn client_routing_round_trips() {
        let registry = Registry::new();
        let id = registry.register_client("localhost:50051".to_string()).await;
        registry.route_client(id, "localhost:50052".to_string()).await;
        registry.deregister_client(id).await;
    }
}
