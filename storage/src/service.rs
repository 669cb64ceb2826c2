//! Storage node: owns the on-disk key/value files and participates as a
//! two-phase-commit participant for the Manager (spec §4.3).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_std::sync::Mutex;
use async_trait::async_trait;
use cache::Cache;
use log::{info, warn};
use rpc::proto::{Reply, StorageService};

use crate::lock_table::LockTable;

pub struct StorageNode {
    pub id: u32,
    data_dir: PathBuf,
    manager_addr: String,
    cache: Cache,
    known_keys: Mutex<HashSet<String>>,
    locks: LockTable,
}

impl StorageNode {
    pub fn new(id: u32, data_dir: PathBuf, manager_addr: String, cache_capacity: usize) -> Self {
        Self {
            id,
            data_dir,
            manager_addr,
            cache: Cache::new(cache_capacity),
            known_keys: Mutex::new(HashSet::new()),
            locks: LockTable::new(),
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(key)
    }

    async fn read_key_file(&self, key: &str) -> std::io::Result<Vec<u8>> {
        async_std::fs::read(self.key_path(key)).await
    }

    async fn write_key_file(&self, key: &str, value: &[u8]) -> std::io::Result<()> {
        async_std::fs::write(self.key_path(key), value).await
    }

    async fn remove_key_file(&self, key: &str) {
        if let Err(e) = async_std::fs::remove_file(self.key_path(key)).await {
            warn!("failed to remove file for key {}: {}", key, e);
        }
    }

    async fn is_known(&self, key: &str) -> bool {
        self.known_keys.lock().await.contains(key)
    }

    async fn contact_manager_for_read(&self, key: &str) -> Reply<Vec<u8>> {
        let request = rpc::proto::ManagerRequest::Get {
            server_id: self.id,
            key: key.to_string(),
        };
        let response: rpc::proto::ManagerResponse = rpc::call(
            &self.manager_addr,
            &request,
            rpc::DEFAULT_DEADLINE,
        )
        .await
        .map_err(|e| e.to_string())?;

        match response {
            rpc::proto::ManagerResponse::Get(reply) => reply,
            other => Err(format!("unexpected manager response: {:?}", other)),
        }
    }

    async fn forward_put(&self, key: &str, value: Vec<u8>) -> Reply<()> {
        let request = rpc::proto::ManagerRequest::Put {
            server_id: self.id,
            key: key.to_string(),
            value,
        };
        let response: rpc::proto::ManagerResponse = rpc::call(
            &self.manager_addr,
            &request,
            rpc::DEFAULT_DEADLINE,
        )
        .await
        .map_err(|e| e.to_string())?;

        match response {
            rpc::proto::ManagerResponse::Put(reply) => reply,
            other => Err(format!("unexpected manager response: {:?}", other)),
        }
    }

    async fn forward_del(&self, key: &str) -> Reply<()> {
        let request = rpc::proto::ManagerRequest::Del {
            server_id: self.id,
            key: key.to_string(),
        };
        let response: rpc::proto::ManagerResponse = rpc::call(
            &self.manager_addr,
            &request,
            rpc::DEFAULT_DEADLINE,
        )
        .await
        .map_err(|e| e.to_string())?;

        match response {
            rpc::proto::ManagerResponse::Del(reply) => reply,
            other => Err(format!("unexpected manager response: {:?}", other)),
        }
    }

    pub async fn register_with_manager(manager_addr: &str, host: &str, port: u16) -> Reply<u32> {
        let request = rpc::proto::ManagerRequest::Online {
            host: host.to_string(),
            port,
        };
        let response: rpc::proto::ManagerResponse =
            rpc::call(manager_addr, &request, rpc::DEFAULT_DEADLINE)
                .await
                .map_err(|e| e.to_string())?;

        match response {
            rpc::proto::ManagerResponse::Online(reply) => reply,
            other => Err(format!("unexpected manager response: {:?}", other)),
        }
    }

    pub async fn deregister_from_manager(&self) {
        let request = rpc::proto::ManagerRequest::Offline { server_id: self.id };
        let result: Result<rpc::proto::ManagerResponse, _> =
            rpc::call(&self.manager_addr, &request, rpc::DEFAULT_DEADLINE).await;
        match result {
            Ok(_) => info!("server {} deregistered from manager", self.id),
            Err(e) => warn!("failed to deregister server {} from manager: {}", self.id, e),
        }
    }

    pub async fn clear_data_dir(&self) {
        if let Err(e) = async_std::fs::remove_dir_all(&self.data_dir).await {
            warn!("failed to clear data dir {:?}: {}", self.data_dir, e);
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[async_trait]
impl StorageService for StorageNode {
    async fn get_data(&self, client_id: u32, key: String) -> Reply<Vec<u8>> {
        info!("client {} requests key {}", client_id, key);

        if let Some(value) = self.cache.get(&key).await {
            return Ok(value);
        }

        if self.is_known(&key).await {
            let entry = match self.locks.get(&key).await {
                Some(entry) => entry,
                None => return Err("该值被另一进程占有".to_string()),
            };
            if !entry.try_acquire_read() {
                return Err("该值被另一进程占有".to_string());
            }

            let result = self.read_key_file(&key).await;
            entry.release_read().await;

            let value = result.map_err(|e| e.to_string())?;
            self.cache.add(&key, value.clone()).await;
            return Ok(value);
        }

        match self.contact_manager_for_read(&key).await {
            Err(_) => Err("未找到键值".to_string()),
            Ok(value) => {
                self.cache.add(&key, value.clone()).await;

                self.known_keys.lock().await.insert(key.clone());
                let entry = self.locks.get_or_create(&key).await;
                entry.acquire_write().await;
                if let Err(e) = self.write_key_file(&key, &value).await {
                    warn!("failed to persist fetched key {}: {}", key, e);
                }
                entry.release_write().await;

                Ok(value)
            }
        }
    }

    async fn put_data(&self, client_id: u32, key: String, value: Vec<u8>) -> Reply<()> {
        info!("client {} submits key {}", client_id, key);
        self.forward_put(&key, value).await
    }

    async fn del_data(&self, client_id: u32, key: String) -> Reply<()> {
        info!("client {} deletes key {}", client_id, key);
        self.forward_del(&key).await
    }

    async fn ma_get(&self, key: String) -> Reply<Vec<u8>> {
        if let Some(value) = self.cache.get(&key).await {
            return Ok(value);
        }

        if !self.is_known(&key).await {
            return Err("服务器中无键值".to_string());
        }

        let entry = match self.locks.get(&key).await {
            Some(entry) => entry,
            None => return Err("无法获取锁".to_string()),
        };
        if !entry.try_acquire_read() {
            return Err("无法获取锁".to_string());
        }

        let result = self.read_key_file(&key).await;
        entry.release_read().await;
        result.map_err(|e| e.to_string())
    }

    async fn ma_put(&self, key: String, value: Vec<u8>) -> Reply<()> {
        self.cache.invalidate(&key).await;

        let entry;
        if !self.is_known(&key).await {
            self.known_keys.lock().await.insert(key.clone());
            entry = self.locks.get_or_create(&key).await;
            entry.set_tentative_prev(None).await;
            entry.acquire_write().await;
        } else {
            entry = self.locks.get_or_create(&key).await;
            entry.acquire_write().await;

            match self.read_key_file(&key).await {
                Ok(prev) => entry.set_tentative_prev(Some(prev)).await,
                Err(e) => {
                    // Resolved Open Question (spec §9): a read failure
                    // during prepare fails prepare outright rather than
                    // rolling forward with an unrecoverable abort path.
                    entry.release_write().await;
                    return Err(format!("无法读取键值{}的原有记录: {}", key, e));
                }
            }
        }

        if let Err(e) = self.write_key_file(&key, &value).await {
            // Resolved Open Question (spec §9): release immediately on a
            // prepare-time write failure instead of leaving the writer
            // lock held for an abort that might never arrive.
            entry.release_write().await;
            return Err(e.to_string());
        }

        Ok(())
    }

    async fn ma_del(&self, key: String) -> Reply<()> {
        self.cache.invalidate(&key).await;

        if !self.is_known(&key).await {
            let entry = self.locks.get_or_create(&key).await;
            entry.set_tentative_prev(None).await;
            entry.acquire_write().await;
            return Ok(());
        }

        let entry = self.locks.get_or_create(&key).await;
        entry.acquire_write().await;

        match self.read_key_file(&key).await {
            Ok(prev) => entry.set_tentative_prev(Some(prev)).await,
            Err(_) => entry.set_tentative_prev(None).await,
        }

        // The file is not removed yet; removal happens at Commit.
        self.known_keys.lock().await.remove(&key);
        Ok(())
    }

    async fn commit(&self, key: String, delete: bool) -> Reply<()> {
        let entry = self.locks.get(&key).await;

        if delete {
            self.remove_key_file(&key).await;
        }

        if let Some(entry) = &entry {
            entry.set_tentative_prev(None).await;
            entry.release_write().await;
        }

        if delete {
            self.locks.remove(&key).await;
        }

        Ok(())
    }

    async fn abort(&self, key: String) -> Reply<()> {
        let entry = match self.locks.get(&key).await {
            Some(entry) => entry,
            None => return Ok(()),
        };

        match entry.take_tentative_prev().await {
            Some(prev) => {
                if let Err(e) = self.write_key_file(&key, &prev).await {
                    warn!("failed to roll back key {} during abort: {}", key, e);
                }
                self.known_keys.lock().await.insert(key.clone());
                entry.release_write().await;
            }
            None => {
                self.known_keys.lock().await.remove(&key);
                self.remove_key_file(&key).await;
                entry.release_write().await;
                self.locks.remove(&key).await;
            }
        }

        Ok(())
    }

    async fn live(&self) -> Reply<()> {
        Ok(())
    }
}
