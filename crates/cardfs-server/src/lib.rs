//! cardfs server library
//!
//! Serves a mounted SD/MMC card over HTTP with the WebDAV subset
//! PROPFIND, GET, PUT, DELETE and MKCOL.

pub mod auth;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod http;
pub mod index;
pub mod multistatus;
pub mod protocol;

pub use auth::Credentials;
pub use config::{ConfigError, ServerConfig};
pub use dispatch::Dispatcher;
pub use protocol::{DispatchError, Outcome, Reply, Request, UploadSession};
