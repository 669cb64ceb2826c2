//! Length-prefixed request/response framing.
//!
//! Every RPC call is one frame in, one frame out: a 4-byte big-endian
//! length prefix followed by that many bytes of `bincode`-encoded payload.
//! This is the "standard length-prefixed request/response framework" the
//! rest of the crate treats as an external collaborator — its exact byte
//! layout is an implementation choice, not a protocol other systems need
//! to interoperate with.

use async_std::io::{ReadExt, WriteExt};
use common::errors::*;

const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

pub async fn write_frame<W: WriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() as u64 > MAX_FRAME_LEN as u64 {
        return Err(format_err!("rpc frame too large: {} bytes", payload.len()));
    }

    let len = (payload.len() as u32).to_be_bytes();
    writer.write_all(&len).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R: ReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(format_err!("rpc frame too large: {} bytes", len));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}
