//! IPC server for the page-rendering front end

pub mod protocol;
pub mod server;

pub use protocol::Command;
pub use server::{IpcServer, ServerState};
