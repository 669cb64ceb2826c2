//! Client connection/reconnect logic (spec §4.5), kept separate from the
//! interactive shell in `main.rs` so it can be exercised directly in tests.

use std::time::Duration;

use common::errors::*;
use rpc::proto::{ManagerRequest, ManagerResponse, StorageRequest, StorageResponse};

const RECONNECT_ATTEMPTS: u32 = 10;
const RECONNECT_DELAY: Duration = Duration::from_millis(200);

pub struct Session {
    pub manager_addr: String,
    pub client_id: u32,
    pub storage_addr: String,
}

impl Session {
    /// Registers a new client against the Manager and connects it to the
    /// storage node it is assigned (spec §4.4 `Connect`).
    pub async fn connect(manager_addr: &str) -> Result<Self> {
        let response: ManagerResponse =
            rpc::call(manager_addr, &ManagerRequest::Connect, rpc::DEFAULT_DEADLINE).await?;

        match response {
            ManagerResponse::Connect(Ok(info)) => {
                let storage_addr = format!("{}:{}", info.host, info.port);
                Ok(Self {
                    manager_addr: manager_addr.to_string(),
                    client_id: info.client_id,
                    storage_addr,
                })
            }
            ManagerResponse::Connect(Err(e)) => Err(err_msg(e)),
            other => Err(format_err!("unexpected manager response: {:?}", other)),
        }
    }

    pub async fn disconnect(&self) {
        let request = ManagerRequest::Disconnect {
            client_id: self.client_id,
        };
        let _: std::result::Result<ManagerResponse, _> =
            rpc::call(&self.manager_addr, &request, rpc::DEFAULT_DEADLINE).await;
    }

    /// Reconnect routine (spec §4.5): up to `RECONNECT_ATTEMPTS` attempts,
    /// asking the Manager to assign a new random storage endpoint. Waits
    /// `RECONNECT_DELAY` between failed attempts.
    pub async fn reconnect(&mut self) -> Result<()> {
        let request = ManagerRequest::ChangeServerRandom {
            client_id: self.client_id,
        };

        for _ in 0..RECONNECT_ATTEMPTS {
            let result: Result<ManagerResponse> =
                rpc::call(&self.manager_addr, &request, rpc::DEFAULT_DEADLINE).await;

            match result {
                Ok(ManagerResponse::ChangeServerRandom(Ok(endpoint))) => {
                    self.storage_addr = endpoint;
                    return Ok(());
                }
                _ => {
                    async_std::task::sleep(RECONNECT_DELAY).await;
                }
            }
        }

        Err(err_msg("无法连接至服务器"))
    }

    pub async fn change_server(&mut self, endpoint: String) -> Result<()> {
        let request = ManagerRequest::ChangeServer {
            client_id: self.client_id,
            endpoint: endpoint.clone(),
        };
        let response: ManagerResponse =
            rpc::call(&self.manager_addr, &request, rpc::DEFAULT_DEADLINE).await?;

        match response {
            ManagerResponse::ChangeServer(Ok(())) => {
                self.storage_addr = endpoint;
                Ok(())
            }
            ManagerResponse::ChangeServer(Err(e)) => Err(err_msg(e)),
            other => Err(format_err!("unexpected manager response: {:?}", other)),
        }
    }

    pub async fn change_server_random(&mut self) -> Result<()> {
        let request = ManagerRequest::ChangeServerRandom {
            client_id: self.client_id,
        };
        let response: ManagerResponse =
            rpc::call(&self.manager_addr, &request, rpc::DEFAULT_DEADLINE).await?;

        match response {
            ManagerResponse::ChangeServerRandom(Ok(endpoint)) => {
                self.storage_addr = endpoint;
                Ok(())
            }
            ManagerResponse::ChangeServerRandom(Err(e)) => Err(err_msg(e)),
            other => Err(format_err!("unexpected manager response: {:?}", other)),
        }
    }

    /// Runs a storage RPC, reconnecting once and retrying on transport
    /// error (spec §4.5).
    async fn call_storage_with_reconnect(&mut self, request: StorageRequest) -> Result<StorageResponse> {
        match rpc::call(&self.storage_addr, &request, rpc::DEFAULT_DEADLINE).await {
            Ok(response) => Ok(response),
            Err(_) => {
                self.reconnect().await?;
                rpc::call(&self.storage_addr, &request, rpc::DEFAULT_DEADLINE).await
            }
        }
    }

    pub async fn get(&mut self, key: String) -> Result<rpc::proto::Reply<Vec<u8>>> {
        let response = self
            .call_storage_with_reconnect(StorageRequest::GetData {
                client_id: self.client_id,
                key,
            })
            .await?;
        match response {
            StorageResponse::GetData(reply) => Ok(reply),
            other => Err(format_err!("unexpected storage response: {:?}", other)),
        }
    }

    pub async fn put(&mut self, key: String, value: Vec<u8>) -> Result<rpc::proto::Reply<()>> {
        let response = self
            .call_storage_with_reconnect(StorageRequest::PutData {
                client_id: self.client_id,
                key,
                value,
            })
            .await?;
        match response {
            StorageResponse::PutData(reply) => Ok(reply),
            other => Err(format_err!("unexpected storage response: {:?}", other)),
        }
    }

    pub async fn del(&mut self, key: String) -> Result<rpc::proto::Reply<()>> {
        let response = self
            .call_storage_with_reconnect(StorageRequest::DelData {
                client_id: self.client_id,
                key,
            })
            .await?;
        match response {
            StorageResponse::DelData(reply) => Ok(reply),
            other => Err(format_err!("unexpected storage response: {:?}", other)),
        }
    }
}
