//! Asynchronous connections: the pipelining [`Session`] and the
//! [`ConnectionPool`] built on top of it.

mod pool;
mod session;

pub use pool::{ConnectionPool, PoolConfig, PoolStats, ScopedConnection};
pub use session::{Session, SessionConfig};
