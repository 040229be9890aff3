//! Lumen management subsystem: admin HTTP API over the configuration
//! service, listener supervision, CLI

pub mod api;
pub mod cli;
pub mod config;
pub mod listener;
pub mod mail;
pub mod security;
pub mod server;

pub use api::{AdminApi, ApiError};
pub use config::{LogFormat, MgmtConfig};
pub use listener::ListenerControl;
