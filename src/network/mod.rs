// Network module - timestamp authority wire protocol, TCP server and client

pub mod client;
pub mod protocol;
pub mod server;

pub use client::TimestampClient;
pub use protocol::{CallerId, REQUEST_LEN, RESPONSE_LEN, TimestampRequest, TimestampResponse};
pub use server::TimestampServer;
