//! Wire message shapes (spec §6). `Reply<T>` is the `{errno, errmes}`
//! envelope from the original spec: `Ok(value)` is `errno = true`,
//! `Err(message)` is `errno = false, errmes = message`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub type Reply<T> = Result<T, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectInfo {
    pub host: String,
    pub port: u16,
    pub client_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ManagerRequest {
    Connect,
    Disconnect { client_id: u32 },
    ChangeServer { client_id: u32, endpoint: String },
    ChangeServerRandom { client_id: u32 },
    Online { host: String, port: u16 },
    Offline { server_id: u32 },
    Get { server_id: u32, key: String },
    Put { server_id: u32, key: String, value: Vec<u8> },
    Del { server_id: u32, key: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ManagerResponse {
    Connect(Reply<ConnectInfo>),
    Disconnect(Reply<()>),
    ChangeServer(Reply<()>),
    ChangeServerRandom(Reply<String>),
    Online(Reply<u32>),
    Offline(Reply<()>),
    Get(Reply<Vec<u8>>),
    Put(Reply<()>),
    Del(Reply<()>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageRequest {
    GetData { client_id: u32, key: String },
    PutData { client_id: u32, key: String, value: Vec<u8> },
    DelData { client_id: u32, key: String },
    MaGet { key: String },
    MaPut { key: String, value: Vec<u8> },
    MaDel { key: String },
    Commit { key: String, delete: bool },
    Abort { key: String },
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageResponse {
    GetData(Reply<Vec<u8>>),
    PutData(Reply<()>),
    DelData(Reply<()>),
    MaGet(Reply<Vec<u8>>),
    MaPut(Reply<()>),
    MaDel(Reply<()>),
    Commit(Reply<()>),
    Abort(Reply<()>),
    Live(Reply<()>),
}

/// Implemented by the Manager's RPC handler. `dispatch` is the single
/// entrypoint the server loop calls; it has a default implementation so
/// service authors only need to implement the individual methods below.
#[async_trait]
pub trait ManagerService: Send + Sync {
    async fn connect(&self) -> Reply<ConnectInfo>;
    async fn disconnect(&self, client_id: u32) -> Reply<()>;
    async fn change_server(&self, client_id: u32, endpoint: String) -> Reply<()>;
    async fn change_server_random(&self, client_id: u32) -> Reply<String>;
    async fn online(&self, host: String, port: u16) -> Reply<u32>;
    async fn offline(&self, server_id: u32) -> Reply<()>;
    async fn get(&self, server_id: u32, key: String) -> Reply<Vec<u8>>;
    async fn put(&self, server_id: u32, key: String, value: Vec<u8>) -> Reply<()>;
    async fn del(&self, server_id: u32, key: String) -> Reply<()>;

    async fn dispatch(&self, request: ManagerRequest) -> ManagerResponse {
        match request {
            ManagerRequest::Connect => ManagerResponse::Connect(self.connect().await),
            ManagerRequest::Disconnect { client_id } => {
                ManagerResponse::Disconnect(self.disconnect(client_id).await)
            }
            ManagerRequest::ChangeServer { client_id, endpoint } => {
                ManagerResponse::ChangeServer(self.change_server(client_id, endpoint).await)
            }
            ManagerRequest::ChangeServerRandom { client_id } => {
                ManagerResponse::ChangeServerRandom(self.change_server_random(client_id).await)
            }
            ManagerRequest::Online { host, port } => {
                ManagerResponse::Online(self.online(host, port).await)
            }
            ManagerRequest::Offline { server_id } => {
                ManagerResponse::Offline(self.offline(server_id).await)
            }
            ManagerRequest::Get { server_id, key } => {
                ManagerResponse::Get(self.get(server_id, key).await)
            }
            ManagerRequest::Put { server_id, key, value } => {
                ManagerResponse::Put(self.put(server_id, key, value).await)
            }
            ManagerRequest::Del { server_id, key } => {
                ManagerResponse::Del(self.del(server_id, key).await)
            }
        }
    }
}

/// Implemented by a Storage node's RPC handler.
#[async_trait]
pub trait StorageService: Send + Sync {
    async fn get_data(&self, client_id: u32, key: String) -> Reply<Vec<u8>>;
    async fn put_data(&self, client_id: u32, key: String, value: Vec<u8>) -> Reply<()>;
    async fn del_data(&self, client_id: u32, key: String) -> Reply<()>;
    async fn ma_get(&self, key: String) -> Reply<Vec<u8>>;
    async fn ma_put(&self, key: String, value: Vec<u8>) -> Reply<()>;
    async fn ma_del(&self, key: String) -> Reply<()>;
    async fn commit(&self, key: String, delete: bool) -> Reply<()>;
    async fn abort(&self, key: String) -> Reply<()>;
    async fn live(&self) -> Reply<()>;

    async fn dispatch(&self, request: StorageRequest) -> StorageResponse {
        match request {
            StorageRequest::GetData { client_id, key } => {
                StorageResponse::GetData(self.get_data(client_id, key).await)
            }
            StorageRequest::PutData { client_id, key, value } => {
                StorageResponse::PutData(self.put_data(client_id, key, value).await)
            }
            StorageRequest::DelData { client_id, key } => {
                StorageResponse::DelData(self.del_data(client_id, key).await)
            }
            StorageRequest::MaGet { key } => StorageResponse::MaGet(self.ma_get(key).await),
            StorageRequest::MaPut { key, value } => {
                StorageResponse::MaPut(self.ma_put(key, value).await)
            }
            StorageRequest::MaDel { key } => StorageResponse::MaDel(self.ma_del(key).await),
            StorageRequest::Commit { key, delete } => {
                StorageResponse::Commit(self.commit(key, delete).await)
            }
            StorageRequest::Abort { key } => StorageResponse::Abort(self.abort(key).await),
            StorageRequest::Live => StorageResponse::Live(self.live().await),
        }
    }
}
