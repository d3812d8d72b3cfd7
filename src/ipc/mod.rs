//! IPC module for communication with UI and service adapters

mod protocol;
mod server;

pub use protocol::{DaemonStatus, ModeInfo, Notification, Request, Response};
pub use server::{Server, ServerContext};
