use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_std::net::{TcpListener, TcpStream};
use async_std::stream::StreamExt;
use async_std::task;
use common::errors::*;
use log::{error, warn};

use crate::frame;

/// A raw, type-erased request dispatcher: decode the request bytes,
/// produce response bytes. `ManagerService::dispatch`/`StorageService::dispatch`
/// plus bincode (de)serialization are wrapped up into one of these by the
/// `manager`/`storage` crates so the transport layer here stays generic.
pub type RawDispatcher =
    Arc<dyn Fn(Vec<u8>) -> Pin<Box<dyn Future<Output = Vec<u8>> + Send>> + Send + Sync>;

pub struct Server {
    listener: TcpListener,
    dispatcher: RawDispatcher,
}

impl Server {
    pub async fn bind(addr: &str, dispatcher: RawDispatcher) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the listener errors out. Each connection
    /// carries exactly one request/response pair (mirroring the client's
    /// one-channel-per-call behavior), handled on its own spawned task so
    /// a slow or stuck peer cannot block the rest of the server.
    pub async fn run(self) -> Result<()> {
        let mut incoming = self.listener.incoming();
        while let Some(stream) = incoming.next().await {
            let stream = stream?;
            task::spawn(Self::handle_connection(stream, self.dispatcher.clone()));
        }
        Ok(())
    }

    async fn handle_connection(mut stream: TcpStream, dispatcher: RawDispatcher) {
        if let Err(e) = Self::handle_connection_inner(&mut stream, dispatcher).await {
            warn!("rpc connection ended with error: {}", e);
        }
    }

    async fn handle_connection_inner(stream: &mut TcpStream, dispatcher: RawDispatcher) -> Result<()> {
        let request_bytes = frame::read_frame(stream).await?;
        let response_bytes = dispatcher(request_bytes).await;
        frame::write_frame(stream, &response_bytes).await?;
        Ok(())
    }
}

/// Builds a `RawDispatcher` from a typed async function. Used by the
/// manager/storage binaries to plug a `ManagerService`/`StorageService`
/// impl into the transport-agnostic `Server`.
pub fn make_dispatcher<F, Fut>(f: F) -> RawDispatcher
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Vec<u8>> + Send + 'static,
{
    Arc::new(move |bytes| Box::pin(f(bytes)))
}

pub fn log_decode_error(context: &str, err: &bincode::Error) {
    error!("{}: failed to decode request: {}", context, err);
}
