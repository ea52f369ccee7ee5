//! Shared helpers for the integration suites

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use shelftier::store::glob_match;
use shelftier::store::resp::RespValue;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Install a fmt subscriber honouring `RUST_LOG`, once per test binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Keyspace = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// Minimal RESP server answering the commands `RespStore` issues
///
/// Expiry is not simulated; `SETEX` records the TTL argument only. `GET`
/// on keys starting with `forbidden` answers with an error reply.
pub struct TestServer {
    pub addr: SocketAddr,
    pub keyspace: Keyspace,
    pub ttls: Arc<Mutex<HashMap<String, u64>>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let keyspace: Keyspace = Arc::default();
        let ttls: Arc<Mutex<HashMap<String, u64>>> = Arc::default();

        let (data, expiries) = (keyspace.clone(), ttls.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, data.clone(), expiries.clone()));
            }
        });

        Self { addr, keyspace, ttls }
    }
}

/// Server that accepts connections and never answers
pub async fn start_silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            open.push(stream);
        }
    });
    addr
}

async fn serve(mut stream: TcpStream, keyspace: Keyspace, ttls: Arc<Mutex<HashMap<String, u64>>>) {
    let mut buffer = BytesMut::with_capacity(4096);

    loop {
        match stream.read_buf(&mut buffer).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        while let Ok(Some(frame)) = RespValue::parse(&mut buffer) {
            let reply = handle(frame, &keyspace, &ttls);
            if stream.write_all(&reply.serialize()).await.is_err() {
                return;
            }
        }
    }
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn handle(frame: RespValue, keyspace: &Keyspace, ttls: &Mutex<HashMap<String, u64>>) -> RespValue {
    let args: Vec<Vec<u8>> = match frame {
        RespValue::Array(Some(items)) => items
            .into_iter()
            .filter_map(|item| item.as_bulk().map(<[u8]>::to_vec))
            .collect(),
        _ => return RespValue::Error("ERR expected array".to_string()),
    };
    let Some((name, rest)) = args.split_first() else {
        return RespValue::Error("ERR empty command".to_string());
    };
    match (text(name).to_uppercase().as_str(), rest) {
        ("GET", [key]) if key.starts_with(b"forbidden") => {
            RespValue::Error("ERR access denied".to_string())
        }
        ("GET", [key]) => RespValue::BulkString(keyspace.lock().get(&text(key)).cloned()),
        ("SETEX", [key, ttl, value]) => match text(ttl).parse::<u64>() {
            Ok(secs) if secs > 0 => {
                keyspace.lock().insert(text(key), value.clone());
                ttls.lock().insert(text(key), secs);
                RespValue::SimpleString("OK".to_string())
            }
            _ => RespValue::Error("ERR invalid expire time in 'setex' command".to_string()),
        },
        ("DEL", keys) => {
            let mut data = keyspace.lock();
            let removed = keys.iter().filter(|key| data.remove(&text(key)).is_some()).count();
            RespValue::Integer(removed as i64)
        }
        ("FLUSHDB", []) => {
            keyspace.lock().clear();
            RespValue::SimpleString("OK".to_string())
        }
        ("KEYS", [pattern]) => {
            let pattern = text(pattern);
            let mut keys: Vec<String> = keyspace
                .lock()
                .keys()
                .filter(|key| glob_match(&pattern, key))
                .cloned()
                .collect();
            keys.sort();
            RespValue::Array(Some(
                keys.into_iter()
                    .map(|key| RespValue::BulkString(Some(key.into_bytes())))
                    .collect(),
            ))
        }
        ("INFO", []) => {
            let count = keyspace.lock().len();
            let body = format!("# Server\r\nredis_version:7.2.0\r\n\r\n# Keyspace\r\ndb0:keys={count},expires={count},avg_ttl=0\r\n");
            RespValue::BulkString(Some(body.into_bytes()))
        }
        (other, _) => RespValue::Error(format!("ERR unknown command '{other}'")),
    }
}
