//! redis-mux is an asynchronous Redis client built around one idea: a
//! single TCP connection can serve many concurrent callers when requests
//! are pipelined and replies are routed back by arrival order.
//!
//! The crate provides:
//!
//! * a RESP2/RESP3 wire codec ([`parse_reply`], [`Cmd`], [`Pipeline`]),
//! * the pipelining async [`Session`](aio::Session) — commands from any
//!   number of tasks are written back-to-back over one socket and each
//!   reply finds its caller without request tags or user-visible locks,
//! * a [`ConnectionPool`](aio::ConnectionPool) that amortizes connection
//!   cost with health checks, sizing and an RAII handle,
//! * a thin blocking [`Connection`] for simple scripts.
//!
//! # Basic operation
//!
//! ```rust,no_run
//! # async fn run() -> redis_mux::RedisResult<()> {
//! let client = redis_mux::Client::open("redis://127.0.0.1/")?;
//! let session = client.get_session().await?;
//!
//! session.set("my_key", 42).await?;
//! let reply = session.get("my_key").await?;
//! assert_eq!(reply.as_string(), "42");
//! # Ok(()) }
//! ```
//!
//! The session handle is cheap to clone; clones share the connection and
//! can submit concurrently:
//!
//! ```rust,no_run
//! # async fn run(session: redis_mux::aio::Session) -> redis_mux::RedisResult<()> {
//! let writer = session.clone();
//! tokio::spawn(async move { writer.incr("hits").await });
//! session.get("hits").await?;
//! # Ok(()) }
//! ```
//!
//! # Pipelines
//!
//! A pipeline is submitted as one batch: its commands are written
//! back-to-back and its replies come back together, in order, even with
//! other callers interleaved on the same session.
//!
//! ```rust,no_run
//! # async fn run(session: redis_mux::aio::Session) -> redis_mux::RedisResult<()> {
//! let mut pipe = redis_mux::pipe();
//! pipe.cmd("SET").arg("a").arg(1);
//! pipe.cmd("INCR").arg("a");
//! let replies = session.request_pipeline(&pipe).await?;
//! assert_eq!(replies.len(), 2);
//! # Ok(()) }
//! ```
//!
//! # Error handling
//!
//! Client-side failures (connect, I/O, framing, timeouts) surface as
//! [`RedisError`] with a [`kind`](RedisError::kind). Server error replies
//! are *values* — [`Value::Error`] — so one failing command inside a
//! pipeline does not abort the batch.

#![deny(non_camel_case_types)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod macros;

pub use crate::client::Client;
pub use crate::cmd::{cmd, pack_command, Cmd};
pub use crate::connection::{
    parse_redis_url, Connection, ConnectionAddr, ConnectionInfo, IntoConnectionInfo,
    RedisConnectionInfo,
};
pub use crate::errors::{ErrorKind, RedisError};
pub use crate::parser::{parse as parse_reply, ParseError};
pub use crate::pipeline::{pipe, Pipeline};
pub use crate::types::{
    ProtocolVersion, PushInfo, PushKind, RedisResult, RedisWrite, ToRedisArgs, Value,
    VerbatimFormat,
};

pub mod aio;
mod buffer;
mod client;
mod cmd;
mod commands;
mod connection;
mod errors;
pub mod io;
mod parser;
mod pipeline;
mod types;
