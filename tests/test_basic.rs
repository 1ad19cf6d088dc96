//! Blocking connection behavior against the in-process mock server.
//!
//! The sync API blocks its thread, so these tests run on a multi-threaded
//! runtime and push the blocking calls onto the blocking pool.

use redis_mux::{Client, ErrorKind, ProtocolVersion, Value};

mod support;
use support::MockServer;

async fn blocking<T, F>(work: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.expect("blocking task")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connect_ping_and_roundtrip() {
    let server = MockServer::start().await;
    let url = server.url();
    blocking(move || {
        let client = Client::open(url).expect("client");
        let mut con = client.get_connection().expect("connection");

        assert_eq!(
            con.ping().expect("ping"),
            Value::SimpleString("PONG".into())
        );

        con.set("sync-key", "sync-value").expect("set");
        assert_eq!(
            con.get("sync-key").expect("get"),
            Value::BulkString(b"sync-value".to_vec())
        );
        assert!(con.get("absent").expect("get").is_nil());

        assert_eq!(con.del("sync-key").expect("del"), Value::Int(1));
        assert!(con.is_open());
        con.close();
        assert!(!con.is_open());
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipeline_replies_come_back_in_order() {
    let server = MockServer::start().await;
    let url = server.url();
    blocking(move || {
        let client = Client::open(url).expect("client");
        let mut con = client.get_connection().expect("connection");

        let mut pipeline = redis_mux::pipe();
        pipeline.cmd("SET").arg("a").arg("1");
        pipeline.cmd("INCR").arg("a");
        pipeline.cmd("GET").arg("a");
        let replies = con.request_pipeline(&pipeline).expect("pipeline");

        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0], Value::SimpleString("OK".into()));
        assert_eq!(replies[1], Value::Int(2));
        assert_eq!(replies[2], Value::BulkString(b"2".to_vec()));
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_pipeline_is_a_no_op() {
    let server = MockServer::start().await;
    let url = server.url();
    blocking(move || {
        let client = Client::open(url).expect("client");
        let mut con = client.get_connection().expect("connection");
        let replies = con.request_pipeline(&redis_mux::pipe()).expect("empty");
        assert!(replies.is_empty());
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handshake_selects_the_database() {
    let server = MockServer::start().await;
    let url = format!("redis://{}/3", server.addr);
    blocking(move || {
        let client = Client::open(url).expect("client");
        let con = client.get_connection().expect("connection");
        assert_eq!(con.db(), 3);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_credentials_fail_the_connect() {
    let server = MockServer::start().await;
    let url = format!("redis://:badpass@{}", server.addr);
    blocking(move || {
        let client = Client::open(url).expect("client");
        let err = client.get_connection().expect_err("bad password");
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn out_of_range_db_fails_the_connect() {
    let server = MockServer::start().await;
    let url = format!("redis://{}/99", server.addr);
    blocking(move || {
        let client = Client::open(url).expect("client");
        let err = client.get_connection().expect_err("bad db index");
        assert_eq!(err.kind(), ErrorKind::DbIndexInvalid);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resp3_handshake_over_the_mock() {
    let server = MockServer::start().await;
    let url = server.url();
    blocking(move || {
        let client = Client::open(url)
            .expect("client")
            .with_protocol(ProtocolVersion::RESP3);
        let mut con = client.get_connection().expect("connection");
        assert_eq!(
            con.ping().expect("ping"),
            Value::SimpleString("PONG".into())
        );
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commands_after_close_fail_fast() {
    let server = MockServer::start().await;
    let url = server.url();
    blocking(move || {
        let client = Client::open(url).expect("client");
        let mut con = client.get_connection().expect("connection");
        con.close();
        let err = con.ping().expect_err("closed");
        assert_eq!(err.kind(), ErrorKind::ConnectionClosed);
    })
    .await;
}
