use std::time::Duration;

use crate::aio::{Session, SessionConfig};
use crate::connection::{Connection, ConnectionInfo, IntoConnectionInfo};
use crate::types::{ProtocolVersion, RedisResult};

/// The client acts as connector to the redis server. By itself it does not
/// do much other than providing a convenient way to fetch a connection from
/// it.
///
/// ```rust,no_run
/// # async fn run() -> redis_mux::RedisResult<()> {
/// let client = redis_mux::Client::open("redis://127.0.0.1/")?;
/// let session = client.get_session().await?;
/// # Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    connection_info: ConnectionInfo,
}

impl Client {
    /// Connects to a redis server and returns a client. This does not
    /// actually open a connection yet but it performs some basic checks on
    /// the URL that might make the operation fail.
    pub fn open<T: IntoConnectionInfo>(params: T) -> RedisResult<Client> {
        Ok(Client {
            connection_info: params.into_connection_info()?,
        })
    }

    /// Chooses the protocol version every connection of this client will
    /// negotiate.
    pub fn with_protocol(mut self, protocol: ProtocolVersion) -> Client {
        self.connection_info.redis.protocol = protocol;
        self
    }

    /// The connection info the client was opened with.
    pub fn get_connection_info(&self) -> &ConnectionInfo {
        &self.connection_info
    }

    /// Opens a new pipelined async session with default configuration.
    /// The returned session has completed the whole handshake.
    pub async fn get_session(&self) -> RedisResult<Session> {
        Session::connect(&self.connection_info, SessionConfig::new()).await
    }

    /// Opens a new pipelined async session with the given configuration.
    pub async fn get_session_with_config(&self, config: SessionConfig) -> RedisResult<Session> {
        Session::connect(&self.connection_info, config).await
    }

    /// Opens a new blocking connection.
    pub fn get_connection(&self) -> RedisResult<Connection> {
        Connection::connect(&self.connection_info, None)
    }

    /// Opens a new blocking connection, bounding the TCP connect by
    /// `timeout`.
    pub fn get_connection_with_timeout(&self, timeout: Duration) -> RedisResult<Connection> {
        Connection::connect(&self.connection_info, Some(timeout))
    }
}
