//! Procall Core - Core abstractions shared by the callable-statement engine
//!
//! This crate provides the fundamental types and traits the other procall
//! crates depend on. It defines:
//!
//! - `Value`, `Row`, `ColumnMeta`, `SqlType` - data exchanged with the server
//! - `ProcallError` - the error taxonomy, including batch aborts
//! - `StatementHandle`, `RowFetcher`, `ConnectionHandle` - the wire-side collaborators
//! - `ConnectionLock` - the connection-wide lock every statement shares
//! - `CallableConfig` - connection settings for callable statements
//! - `codec` - typed getters and registered-type coercion

pub mod codec;
mod config;
mod connection;
mod error;
mod types;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod connection_tests;

pub use codec::FromValue;
pub use config::*;
pub use connection::*;
pub use error::*;
pub use types::*;
