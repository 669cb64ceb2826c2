use std::time::Duration;

use async_std::net::TcpStream;
use common::errors::*;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::frame;

/// Deadline applied to an entire call (connect + write + read).
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);

/// Opens a fresh connection to `addr`, sends one request frame, and waits
/// for one response frame. Mirrors the original client's pattern of
/// opening a new channel per call rather than keeping one open; a
/// transport error (including a deadline expiry) is surfaced to the
/// caller, who treats it as "that participant did not answer" (spec §5).
pub async fn call<Req, Resp>(addr: &str, request: &Req, deadline: Duration) -> Result<Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    async_std::future::timeout(deadline, call_inner(addr, request))
        .await
        .map_err(|_| format_err!("rpc call to {} timed out after {:?}", addr, deadline))?
}

async fn call_inner<Req, Resp>(addr: &str, request: &Req) -> Result<Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let mut stream = TcpStream::connect(addr).await?;

    let payload = bincode::serialize(request).map_err(|e| format_err!("rpc encode error: {}", e))?;
    frame::write_frame(&mut stream, &payload).await?;

    let response_bytes = frame::read_frame(&mut stream).await?;
    let response = bincode::deserialize(&response_bytes)
        .map_err(|e| format_err!("rpc decode error: {}", e))?;
    Ok(response)
}
