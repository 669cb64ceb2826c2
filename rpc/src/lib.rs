//! A small length-prefixed RPC transport used by the Manager and Storage
//! services (spec §6). The wire format and connection-per-call behavior
//! are an internal implementation choice standing in for "a standard
//! length-prefixed request/response framework with deadlines" — the rest
//! of the crate only depends on the `proto` message shapes and the
//! `call`/`Server` entrypoints below.

mod client;
mod frame;
mod server;

pub mod proto;

pub use client::{call, DEFAULT_DEADLINE};
pub use server::{log_decode_error, make_dispatcher, RawDispatcher, Server};
