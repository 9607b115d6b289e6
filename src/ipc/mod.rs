//! IPC subsystem: Unix socket server with s-expression protocol.

pub mod dispatch;
pub mod framing;
pub mod server;

pub use server::IpcServer;
