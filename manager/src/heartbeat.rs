//! Background liveness probing (spec §4.4 "Liveness loop"). Wakes every
//! `interval`, snapshots the registry, and probes each server with
//! `Live()`; unreachable servers are dropped from the registry.

use std::sync::Arc;
use std::time::Duration;

use async_std::task;
use common::task::ChildTask;
use log::warn;
use rpc::proto::{StorageRequest, StorageResponse};

use crate::registry::Registry;

pub fn spawn(registry: Arc<Registry>, interval: Duration) -> ChildTask {
    ChildTask::spawn(async move {
        loop {
            task::sleep(interval).await;
            probe_once(&registry).await;
        }
    })
}

async fn probe_once(registry: &Registry) {
    for (id, node) in registry.snapshot_servers().await {
        let endpoint = node.endpoint();
        let result = rpc::call::<StorageRequest, StorageResponse>(
            &endpoint,
            &StorageRequest::Live,
            rpc::DEFAULT_DEADLINE,
        )
        .await;

        if result.is_err() {
            warn!("与存储服务器 {} ({}) 心跳失败, 移除", id, endpoint);
            registry.deregister_server(id).await;
        }
    }
}
