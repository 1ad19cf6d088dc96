//! In-process redis stand-ins for the integration tests.
//!
//! [`MockServer`] speaks just enough RESP over a real TCP listener for the
//! handshake, the basic commands, and the pool's PING probes, so the tests
//! run without an external redis-server.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use redis_mux::{parse_reply, Value};

type Store = Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>;

pub struct MockServer {
    pub addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let store: Store = Arc::new(Mutex::new(HashMap::new()));
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(serve_client(stream, Arc::clone(&store)));
            }
        });
        MockServer { addr, accept_task }
    }

    pub fn url(&self) -> String {
        format!("redis://{}", self.addr)
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_client(mut stream: TcpStream, store: Store) {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        loop {
            match parse_reply(&buf) {
                Ok((consumed, request)) => {
                    buf.drain(..consumed);
                    let response = respond(&request, &store);
                    if stream.write_all(&response).await.is_err() {
                        return;
                    }
                }
                Err(err) if err.is_incomplete() => break,
                Err(_) => return,
            }
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

fn arg(request: &[Value], index: usize) -> Vec<u8> {
    request
        .get(index)
        .map(|value| value.as_bytes().to_vec())
        .unwrap_or_default()
}

fn bulk(bytes: &[u8]) -> Vec<u8> {
    let mut out = format!("${}\r\n", bytes.len()).into_bytes();
    out.extend_from_slice(bytes);
    out.extend_from_slice(b"\r\n");
    out
}

fn respond(request: &Value, store: &Store) -> Vec<u8> {
    let parts = match request.as_sequence() {
        Some(parts) if !parts.is_empty() => parts,
        _ => return b"-ERR protocol violation\r\n".to_vec(),
    };
    let name = arg(parts, 0).to_ascii_uppercase();
    match name.as_slice() {
        b"PING" => b"+PONG\r\n".to_vec(),
        b"ECHO" => bulk(&arg(parts, 1)),
        b"HELLO" => b"%1\r\n$6\r\nserver\r\n$4\r\nmock\r\n".to_vec(),
        b"AUTH" => {
            // The password is the last argument in both AUTH forms.
            if arg(parts, parts.len() - 1) == b"badpass" {
                b"-WRONGPASS invalid username-password pair\r\n".to_vec()
            } else {
                b"+OK\r\n".to_vec()
            }
        }
        b"SELECT" => {
            let db = String::from_utf8_lossy(&arg(parts, 1))
                .parse::<i64>()
                .unwrap_or(-1);
            if (0..16).contains(&db) {
                b"+OK\r\n".to_vec()
            } else {
                b"-ERR DB index is out of range\r\n".to_vec()
            }
        }
        b"SET" => {
            let mut store = store.lock().unwrap();
            store.insert(arg(parts, 1), arg(parts, 2));
            b"+OK\r\n".to_vec()
        }
        b"GET" => {
            let store = store.lock().unwrap();
            match store.get(&arg(parts, 1)) {
                Some(value) => bulk(value),
                None => b"$-1\r\n".to_vec(),
            }
        }
        b"DEL" => {
            let mut store = store.lock().unwrap();
            let mut removed = 0;
            for index in 1..parts.len() {
                if store.remove(&arg(parts, index)).is_some() {
                    removed += 1;
                }
            }
            format!(":{removed}\r\n").into_bytes()
        }
        b"EXISTS" => {
            let store = store.lock().unwrap();
            let mut found = 0;
            for index in 1..parts.len() {
                if store.contains_key(&arg(parts, index)) {
                    found += 1;
                }
            }
            format!(":{found}\r\n").into_bytes()
        }
        b"INCR" => {
            let key = arg(parts, 1);
            let mut store = store.lock().unwrap();
            let current = store
                .get(&key)
                .and_then(|value| String::from_utf8_lossy(value).parse::<i64>().ok())
                .unwrap_or(0);
            let next = current + 1;
            store.insert(key, next.to_string().into_bytes());
            format!(":{next}\r\n").into_bytes()
        }
        b"FLUSHDB" => {
            store.lock().unwrap().clear();
            b"+OK\r\n".to_vec()
        }
        _ => b"-ERR unknown command\r\n".to_vec(),
    }
}
