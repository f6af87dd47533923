//! Shared `SQLite` infrastructure.
//!
//! - [`acquire_lock`]: poison-tolerant access to the `Mutex<Connection>`
//! - [`open_connection`] / [`configure_connection`]: WAL, synchronous, busy timeout
//! - [`store_error`] / [`query_error`]: driver error mapping

mod connection;

pub use connection::{
    acquire_lock, configure_connection, open_connection, query_error, store_error,
};
