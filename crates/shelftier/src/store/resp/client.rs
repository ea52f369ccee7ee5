//! L2 store backed by a RESP2 server (Redis or a compatible daemon)

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::codec::RespValue;
use crate::error::{StoreError, StoreResult};
use crate::store::{ttl_secs, L2Store};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

struct Connection {
    stream: TcpStream,
    buf: BytesMut,
    /// Set while a request is written but its reply not yet read
    awaiting_reply: bool,
}

impl Connection {
    async fn connect(addr: &str) -> StoreResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(addr, "connected to l2 store");
        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(4096),
            awaiting_reply: false,
        })
    }

    async fn request(&mut self, cmd: &RespValue) -> StoreResult<RespValue> {
        self.awaiting_reply = true;
        self.stream.write_all(&cmd.serialize()).await?;

        loop {
            if let Some(reply) =
                RespValue::parse(&mut self.buf).map_err(|e| StoreError::Protocol(e.to_string()))?
            {
                self.awaiting_reply = false;
                return Ok(reply);
            }

            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Err(StoreError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                )));
            }
        }
    }
}

/// RESP2 client implementing [`L2Store`]
///
/// Holds one lazily opened connection. Requests are serialized over it; a
/// connection is dropped after any error or when a cancelled request left a
/// reply unread, and reopened on the next call.
pub struct RespStore {
    addr: String,
    timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl RespStore {
    /// Client for the server at `addr` (`host:port`)
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_TIMEOUT,
            conn: Mutex::new(None),
        }
    }

    /// Set the per-request timeout (connect included)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Server address
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn call(&self, cmd: RespValue) -> StoreResult<RespValue> {
        let mut slot = self.conn.lock().await;

        if slot.as_ref().is_some_and(|conn| conn.awaiting_reply) {
            debug!(addr = %self.addr, "discarding connection with an unread reply");
            *slot = None;
        }

        let result = tokio::time::timeout(self.timeout, exchange(&mut slot, &self.addr, &cmd)).await;
        let reply = match result {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                *slot = None;
                return Err(err);
            }
            Err(_) => {
                *slot = None;
                warn!(addr = %self.addr, timeout = ?self.timeout, "l2 request timed out");
                return Err(StoreError::Timeout(self.timeout));
            }
        };

        match reply {
            RespValue::Error(message) => Err(StoreError::Server(message)),
            reply => Ok(reply),
        }
    }
}

async fn exchange(slot: &mut Option<Connection>, addr: &str, cmd: &RespValue) -> StoreResult<RespValue> {
    let conn = match slot.take() {
        Some(conn) => conn,
        None => Connection::connect(addr).await?,
    };
    slot.insert(conn).request(cmd).await
}

fn unexpected(command: &str, reply: RespValue) -> StoreError {
    StoreError::Protocol(format!("unexpected reply to {command}: {reply:?}"))
}

fn expect_ok(command: &str, reply: RespValue) -> StoreResult<()> {
    match reply {
        RespValue::SimpleString(_) => Ok(()),
        other => Err(unexpected(command, other)),
    }
}

/// Parse `INFO` text: `key:value` lines, `#` section headers skipped
pub fn parse_info(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[async_trait]
impl L2Store for RespStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.call(RespValue::command(["GET", key])).await? {
            RespValue::BulkString(data) => Ok(data),
            other => Err(unexpected("GET", other)),
        }
    }

    async fn set_with_ttl(&self, key: &str, ttl: Duration, value: Vec<u8>) -> StoreResult<()> {
        let secs = ttl_secs(ttl).to_string();
        let cmd = RespValue::command([
            b"SETEX".to_vec(),
            key.as_bytes().to_vec(),
            secs.into_bytes(),
            value,
        ]);
        expect_ok("SETEX", self.call(cmd).await?)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        match self.call(RespValue::command(["DEL", key])).await? {
            RespValue::Integer(_) => Ok(()),
            other => Err(unexpected("DEL", other)),
        }
    }

    async fn flush_all(&self) -> StoreResult<()> {
        expect_ok("FLUSHDB", self.call(RespValue::command(["FLUSHDB"])).await?)
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        match self.call(RespValue::command(["KEYS", pattern])).await? {
            RespValue::Array(items) => items
                .unwrap_or_default()
                .into_iter()
                .map(|item| match item {
                    RespValue::BulkString(Some(key)) => String::from_utf8(key)
                        .map_err(|_| StoreError::Protocol("non UTF-8 key in KEYS reply".to_string())),
                    other => Err(unexpected("KEYS", other)),
                })
                .collect(),
            other => Err(unexpected("KEYS", other)),
        }
    }

    async fn info(&self) -> StoreResult<HashMap<String, String>> {
        match self.call(RespValue::command(["INFO"])).await? {
            RespValue::BulkString(Some(text)) => Ok(parse_info(&String::from_utf8_lossy(&text))),
            other => Err(unexpected("INFO", other)),
        }
    }
}
