//! Two-phase write coordination and quorum reads (spec §4.4). `Put`/`Del`
//! are serialized cluster-wide by `coordination_mu`; `Get` is not.

use std::collections::HashMap;

use async_std::sync::Mutex;
use log::{error, info, warn};
use rpc::proto::{Reply, StorageRequest, StorageResponse};

use crate::registry::Registry;

pub struct Coordinator {
    registry: std::sync::Arc<Registry>,
    coordination_mu: Mutex<()>,
}

impl Coordinator {
    pub fn new(registry: std::sync::Arc<Registry>) -> Self {
        Self {
            registry,
            coordination_mu: Mutex::new(()),
        }
    }

    async fn call_storage(endpoint: &str, request: StorageRequest) -> Option<StorageResponse> {
        match rpc::call::<StorageRequest, StorageResponse>(endpoint, &request, rpc::DEFAULT_DEADLINE).await {
            Ok(response) => Some(response),
            Err(e) => {
                warn!("storage call to {} failed: {}", endpoint, e);
                None
            }
        }
    }

    /// Majority-value quorum read across every registered server other
    /// than `caller_id` (spec §4.4 `Get`).
    pub async fn get(&self, caller_id: u32, key: &str) -> Reply<Vec<u8>> {
        let servers = self.registry.snapshot_servers().await;

        let mut values = Vec::new();
        for (id, node) in &servers {
            if *id == caller_id {
                continue;
            }
            let endpoint = node.endpoint();
            info!("向存储服务器{} 请求键值{}", id, key);
            let response = Self::call_storage(
                &endpoint,
                StorageRequest::MaGet { key: key.to_string() },
            )
            .await;

            match response {
                Some(StorageResponse::MaGet(Ok(value))) => values.push(value),
                Some(StorageResponse::MaGet(Err(e))) => {
                    info!("无法从存储服务器{} 获取键值{} ,{}", id, key, e)
                }
                _ => {}
            }
        }

        let total = values.len();
        if total == 0 {
            return Err(format!("暂时缺少键值{}", key));
        }

        let mut counts: HashMap<Vec<u8>, usize> = HashMap::new();
        let mut order: Vec<Vec<u8>> = Vec::new();
        for value in &values {
            if !counts.contains_key(value) {
                order.push(value.clone());
            }
            *counts.entry(value.clone()).or_insert(0) += 1;
        }

        let mut best_value = order[0].clone();
        let mut best_count = 0usize;
        for value in &order {
            let count = counts[value];
            if count > best_count {
                best_count = count;
                best_value = value.clone();
            }
        }

        if best_count > total / 2 {
            info!("键值{} 达成一致", key);
            Ok(best_value)
        } else {
            Err(format!("其他服务器对键值{} 无法达成一致", key))
        }
    }

    /// Two-phase write: prepare on every registered server (including the
    /// caller), then commit or abort on every server that prepared
    /// successfully (spec §4.4 `Put`/`Del`).
    pub async fn write(&self, key: &str, value: Option<Vec<u8>>) -> Reply<()> {
        let _guard = self.coordination_mu.lock().await;
        let delete = value.is_none();
        let servers = self.registry.snapshot_servers().await;

        let mut prepared: HashMap<u32, String> = HashMap::new();
        let mut prepare_ok = true;

        for (id, node) in &servers {
            let endpoint = node.endpoint();
            let request = match &value {
                Some(value) => StorageRequest::MaPut {
                    key: key.to_string(),
                    value: value.clone(),
                },
                None => StorageRequest::MaDel { key: key.to_string() },
            };

            let response = match Self::call_storage(&endpoint, request).await {
                Some(response) => response,
                None => continue,
            };

            let ok = match response {
                StorageResponse::MaPut(result) => result.is_ok(),
                StorageResponse::MaDel(result) => result.is_ok(),
                other => {
                    error!("unexpected prepare response from {}: {:?}", endpoint, other);
                    false
                }
            };

            prepared.insert(*id, endpoint);
            if !ok {
                prepare_ok = false;
            }
        }

        if prepare_ok {
            for endpoint in prepared.values() {
                let request = StorageRequest::Commit {
                    key: key.to_string(),
                    delete,
                };
                let _ = Self::call_storage(endpoint, request).await;
            }
            Ok(())
        } else {
            for endpoint in prepared.values() {
                let request = StorageRequest::Abort { key: key.to_string() };
                let _ = Self::call_storage(endpoint, request).await;
            }
            Err(if delete { "删除失败".to_string() } else { "提交失败".to_string() })
        }
    }
}
