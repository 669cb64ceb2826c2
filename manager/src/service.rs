//! `ManagerService` implementation tying the registry and coordinator
//! together (spec §4.4).

use async_trait::async_trait;
use log::info;
use rpc::proto::{ConnectInfo, ManagerService, Reply};
use std::sync::Arc;

use crate::coordinator::Coordinator;
use crate::registry::Registry;

const UNAUTHORIZED: &str = "节点未注册, 无权操作!";

pub struct Manager {
    registry: Arc<Registry>,
    coordinator: Coordinator,
}

impl Manager {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            coordinator: Coordinator::new(registry.clone()),
            registry,
        }
    }
}

#[async_trait]
impl ManagerService for Manager {
    async fn connect(&self) -> Reply<ConnectInfo> {
        let (_, node) = self
            .registry
            .random_server()
            .await
            .ok_or_else(|| "连接失败, 目前暂无键值服务器".to_string())?;
        let endpoint = node.endpoint();
        let client_id = self.registry.register_client(endpoint.clone()).await;
        info!("客户端连接{}, 为其分配id: {}", endpoint, client_id);
        Ok(ConnectInfo {
            host: node.host,
            port: node.port,
            client_id,
        })
    }

    async fn disconnect(&self, client_id: u32) -> Reply<()> {
        info!("客户端{} 申请退出连接", client_id);
        self.registry.deregister_client(client_id).await;
        Ok(())
    }

    async fn change_server(&self, client_id: u32, endpoint: String) -> Reply<()> {
        info!("客户端{} 试图更换服务器为{}", client_id, endpoint);
        if !self.registry.endpoint_exists(&endpoint).await {
            return Err("不存在此存储服务器".to_string());
        }
        self.registry.route_client(client_id, endpoint).await;
        Ok(())
    }

    async fn change_server_random(&self, client_id: u32) -> Reply<String> {
        let (_, node) = self
            .registry
            .random_server()
            .await
            .ok_or_else(|| "连接失败, 目前暂无键值服务器".to_string())?;
        let endpoint = node.endpoint();
        self.registry.route_client(client_id, endpoint.clone()).await;
        info!("成功为客户端{} 更换连接服务器为{}", client_id, endpoint);
        Ok(endpoint)
    }

    async fn online(&self, host: String, port: u16) -> Reply<u32> {
        let id = self.registry.register_server(host.clone(), port).await;
        info!("存储服务器 {}:{} 注册 分配id为: {}", host, port, id);
        Ok(id)
    }

    async fn offline(&self, server_id: u32) -> Reply<()> {
        self.registry.deregister_server(server_id).await;
        info!("存储服务器 {} 注消", server_id);
        Ok(())
    }

    async fn get(&self, server_id: u32, key: String) -> Reply<Vec<u8>> {
        if !self.registry.is_registered(server_id).await {
            return Err(UNAUTHORIZED.to_string());
        }
        self.coordinator.get(server_id, &key).await
    }

    async fn put(&self, server_id: u32, key: String, value: Vec<u8>) -> Reply<()> {
        if !self.registry.is_registered(server_id).await {
            return Err(UNAUTHORIZED.to_string());
        }
        self.coordinator.write(&key, Some(value)).await
    }

    async fn del(&self, server_id: u32, key: String) -> Reply<()> {
        if !self.registry.is_registered(server_id).await {
            return Err(UNAUTHORIZED.to_string());
        }
        self.coordinator.write(&key, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[async_std::test]
    async fn unregistered_server_id_is_rejected() {
        let registry = Arc::new(Registry::new());
        let manager = Manager::new(registry);
        let fake_sid = 123_456;

        let put = manager.put(fake_sid, "testkey".to_string(), b"testvalue".to_vec()).await;
        assert_eq!(put, Err(UNAUTHORIZED.to_string()));

        let get = manager.get(fake_sid, "testkey".to_string()).await;
        assert_eq!(get, Err(UNAUTHORIZED.to_string()));

        let del = manager.del(fake_sid, "testkey".to_string()).await;
        assert_eq!(del, Err(UNAUTHORIZED.to_string()));
    }

    #[async_std::test]
    async fn connect_fails_with_no_servers() {
        let registry = Arc::new(Registry::new());
        let manager = Manager::new(registry);
        assert!(manager.connect().await.is_err());
    }

    #[async_std::test]
    async fn online_then_offline_round_trips() {
        let registry = Arc::new(Registry::new());
        let manager = Manager::new(registry.clone());

        let id = manager.online("localhost".to_string(), 50051).await.unwrap();
        assert!(registry.is_registered(id).await);

        manager.offline(id).await.unwrap();
        assert!(!registry.is_registered(id).await);
    }

    #[async_std::test]
    async fn change_server_rejects_unknown_endpoint() {
        let registry = Arc::new(Registry::new());
        let manager = Manager::new(registry.clone());
        manager.online("localhost".to_string(), 50051).await.unwrap();
        let client_id = registry.register_client("localhost:50051".to_string()).await;

        let err = manager
            .change_server(client_id, "localhost:50052".to_string())
            .await
            .unwrap_err();
        assert_eq!(err, "不存在此存储服务器");
    }

    #[async_std::test]
    async fn change_server_accepts_known_endpoint() {
        let registry = Arc::new(Registry::new());
        let manager = Manager::new(registry.clone());
        manager.online("localhost".to_string(), 50051).await.unwrap();
        manager.online("localhost".to_string(), 50052).await.unwrap();
        let client_id = registry.register_client("localhost:50051".to_string()).await;

        manager
            .change_server(client_id, "localhost:50052".to_string())
            .await
            .unwrap();

        assert_eq!(
            manager.change_server(client_id, "bogus".to_string()).await,
            Err("不存在此存储服务器".to_string())
        );
    }

    #[async_std::test]
    async fn change_server_random_picks_among_registered_servers() {
        let registry = Arc::new(Registry::new());
        let manager = Manager::new(registry.clone());
        manager.online("localhost".to_string(), 50051).await.unwrap();
        manager.online("localhost".to_string(), 50052).await.unwrap();
        let client_id = registry.register_client(String::new()).await;

        let chosen = manager.change_server_random(client_id).await.unwrap();
        assert!(chosen == "localhost:50051" || chosen == "localhost:50052");
    }
}
