//! Persistence layer — shared key-value store for sessions and seen markers.

pub mod libsql_backend;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::KvStore;
