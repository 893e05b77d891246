//! Synchronous RESP2 store reader
//!
//! Holds a small pool of blocking connections so classifier workers can
//! issue reads concurrently. A connection that hits any error is dropped
//! rather than returned to the pool, since its stream may be mid-frame.
//!
//! Keys are arbitrary bytes on the server. Keys that are valid UTF-8 are
//! classified under their own text; any other key gets an escaped name
//! (`\xNN` per invalid byte, suffixed `#n` if that name is already taken)
//! and the store remembers the original bytes so `TYPE` and the value reads
//! address the real key.

use super::resp::{FrameScanner, RespError, RespParser, RespValue};
use super::{StoreReader, StoreValue, TypeTag};
use crate::error::StoreError;
use ahash::{AHashMap, AHashSet};
use bytes::{Buf, BytesMut};
use parking_lot::{Mutex, RwLock};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;
use std::fmt::Write as _;
use tracing::{debug, warn};

/// Connection settings for [`RespStore`]
#[derive(Debug, Clone)]
pub struct RespStoreConfig {
    /// `host:port` of the store
    pub addr: String,
    /// Logical database index (`SELECT`)
    pub db: u32,
    /// Read/write timeout; full-collection reads of large keys can be slow
    pub timeout: Duration,
    /// `COUNT` hint passed to `SCAN`
    pub scan_count: usize,
    /// Idle connections kept for reuse
    pub max_idle: usize,
}

impl Default for RespStoreConfig {
    fn default() -> Self {
        RespStoreConfig {
            addr: "127.0.0.1:6379".to_string(),
            db: 0,
            timeout: Duration::from_secs(60),
            scan_count: 1000,
            max_idle: 16,
        }
    }
}

struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
    scanner: FrameScanner,
}

impl Connection {
    fn open(config: &RespStoreConfig) -> Result<Self, StoreError> {
        let stream = TcpStream::connect(&config.addr)?;
        stream.set_read_timeout(Some(config.timeout))?;
        stream.set_write_timeout(Some(config.timeout))?;
        stream.set_nodelay(true)?;

        let mut conn = Connection {
            stream,
            buffer: BytesMut::with_capacity(8192),
            scanner: FrameScanner::new(),
        };

        if config.db != 0 {
            let db = config.db.to_string();
            match conn.command(&[b"SELECT", db.as_bytes()])? {
                RespValue::SimpleString(ok) if ok == "OK" => {}
                other => {
                    return Err(StoreError::UnexpectedReply {
                        command: "SELECT",
                        reply: other.describe(),
                    })
                }
            }
        }

        debug!(addr = %config.addr, db = config.db, "Opened store connection");
        Ok(conn)
    }

    fn command(&mut self, args: &[&[u8]]) -> Result<RespValue, StoreError> {
        let frame = RespParser::encode_command(args);
        self.stream.write_all(&frame)?;

        let mut chunk = [0u8; 16 * 1024];
        loop {
            match self.scanner.scan(&self.buffer) {
                Ok(Some(len)) => {
                    let parsed = RespParser::parse(&self.buffer[..len]);
                    self.buffer.advance(len);
                    return match parsed {
                        Ok((RespValue::Error(message), _)) => Err(StoreError::Server(message)),
                        Ok((value, _)) => Ok(value),
                        Err(RespError::Incomplete) => Err(StoreError::Protocol(
                            "frame ended early".to_string(),
                        )),
                        Err(RespError::Invalid(message)) => Err(StoreError::Protocol(message)),
                    };
                }
                Ok(None) | Err(RespError::Incomplete) => {}
                Err(RespError::Invalid(message)) => return Err(StoreError::Protocol(message)),
            }

            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "store closed the connection",
                )));
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}

/// [`StoreReader`] backed by a live Redis-compatible server
pub struct RespStore {
    config: RespStoreConfig,
    idle: Mutex<Vec<Connection>>,
    /// Original bytes of non-UTF-8 keys, by the name they were enumerated under
    binary_keys: RwLock<AHashMap<String, Vec<u8>>>,
}

impl RespStore {
    /// Connect eagerly so an unreachable store fails the run up front
    pub fn connect(config: RespStoreConfig) -> Result<Self, StoreError> {
        let first = Connection::open(&config)?;
        Ok(RespStore {
            config,
            idle: Mutex::new(vec![first]),
            binary_keys: RwLock::new(AHashMap::new()),
        })
    }

    /// Keys from the last enumeration that were not valid UTF-8
    pub fn binary_key_count(&self) -> usize {
        self.binary_keys.read().len()
    }

    /// Bytes to send for `key`: the remembered original for escaped names
    fn key_bytes(&self, key: &str) -> Option<Vec<u8>> {
        let binary = self.binary_keys.read();
        if binary.is_empty() {
            return None;
        }
        binary.get(key).cloned()
    }

    fn command(&self, command: &'static str, args: &[&[u8]]) -> Result<RespValue, StoreError> {
        let pooled = self.idle.lock().pop();
        let mut conn = match pooled {
            Some(conn) => conn,
            None => Connection::open(&self.config)?,
        };

        let mut full: Vec<&[u8]> = Vec::with_capacity(args.len() + 1);
        full.push(command.as_bytes());
        full.extend_from_slice(args);

        let reply = conn.command(&full)?;

        let mut idle = self.idle.lock();
        if idle.len() < self.config.max_idle {
            idle.push(conn);
        }
        Ok(reply)
    }

    fn bulk_items(command: &'static str, reply: RespValue) -> Result<Vec<Vec<u8>>, StoreError> {
        match reply {
            RespValue::Array(None) => Ok(Vec::new()),
            RespValue::Array(Some(items)) => items
                .into_iter()
                .map(|item| match item {
                    RespValue::BulkString(Some(data)) => Ok(data),
                    RespValue::BulkString(None) => Ok(Vec::new()),
                    other => Err(StoreError::UnexpectedReply {
                        command,
                        reply: other.describe(),
                    }),
                })
                .collect(),
            other => Err(StoreError::UnexpectedReply {
                command,
                reply: other.describe(),
            }),
        }
    }
}

impl StoreReader for RespStore {
    /// Walks the keyspace with `SCAN` rather than `KEYS *` so the server is
    /// never blocked for the whole enumeration. `SCAN` may repeat keys; they
    /// are de-duplicated here by their raw bytes, preserving first-seen order.
    fn enumerate_keys(&self) -> Result<Vec<String>, StoreError> {
        let count = self.config.scan_count.max(1).to_string();
        let mut cursor = "0".to_string();
        let mut seen: AHashSet<Vec<u8>> = AHashSet::new();
        let mut raw_keys = Vec::new();

        loop {
            let reply = self.command(
                "SCAN",
                &[cursor.as_bytes(), b"COUNT", count.as_bytes()],
            )?;
            let (next, batch) = match reply {
                RespValue::Array(Some(mut parts)) if parts.len() == 2 => {
                    let batch = parts.pop().unwrap_or(RespValue::Array(None));
                    let next = match parts.pop() {
                        Some(RespValue::BulkString(Some(c))) => {
                            String::from_utf8_lossy(&c).to_string()
                        }
                        other => {
                            return Err(StoreError::UnexpectedReply {
                                command: "SCAN",
                                reply: format!("{:?}", other),
                            })
                        }
                    };
                    (next, Self::bulk_items("SCAN", batch)?)
                }
                other => {
                    return Err(StoreError::UnexpectedReply {
                        command: "SCAN",
                        reply: other.describe(),
                    })
                }
            };

            for raw in batch {
                if !seen.contains(&raw) {
                    seen.insert(raw.clone());
                    raw_keys.push(raw);
                }
            }

            if next == "0" {
                break;
            }
            cursor = next;
        }

        let names = name_keys(raw_keys);
        if !names.binary.is_empty() {
            warn!(
                count = names.binary.len(),
                "Keys are not valid UTF-8, classifying them under escaped names"
            );
        }
        debug!(keys = names.names.len(), "Enumerated keyspace");
        *self.binary_keys.write() = names.binary;
        Ok(names.names)
    }

    fn type_of(&self, key: &str) -> Result<TypeTag, StoreError> {
        let binary = self.key_bytes(key);
        let k = binary.as_deref().unwrap_or(key.as_bytes());
        match self.command("TYPE", &[k])? {
            RespValue::SimpleString(name) => Ok(TypeTag::parse(&name)),
            other => Err(StoreError::UnexpectedReply {
                command: "TYPE",
                reply: other.describe(),
            }),
        }
    }

    fn read(&self, key: &str, tag: &TypeTag) -> Result<StoreValue, StoreError> {
        let binary = self.key_bytes(key);
        let k = binary.as_deref().unwrap_or(key.as_bytes());
        match tag {
            TypeTag::None => Ok(StoreValue::None),
            TypeTag::Unknown(name) => Ok(StoreValue::Unknown(name.clone())),
            TypeTag::String => match self.command("GET", &[k])? {
                RespValue::BulkString(Some(data)) => Ok(StoreValue::String(data)),
                // expired between TYPE and GET
                RespValue::BulkString(None) => Ok(StoreValue::None),
                other => Err(StoreError::UnexpectedReply {
                    command: "GET",
                    reply: other.describe(),
                }),
            },
            TypeTag::List => {
                let reply = self.command("LRANGE", &[k, b"0", b"-1"])?;
                Ok(StoreValue::List(Self::bulk_items("LRANGE", reply)?))
            }
            TypeTag::Set => {
                let reply = self.command("SMEMBERS", &[k])?;
                Ok(StoreValue::Set(Self::bulk_items("SMEMBERS", reply)?))
            }
            TypeTag::SortedSet => {
                let reply = self.command("ZRANGE", &[k, b"0", b"-1"])?;
                Ok(StoreValue::SortedSet(Self::bulk_items("ZRANGE", reply)?))
            }
            TypeTag::Hash => {
                let reply = self.command("HGETALL", &[k])?;
                let flat = Self::bulk_items("HGETALL", reply)?;
                if flat.len() % 2 != 0 {
                    return Err(StoreError::UnexpectedReply {
                        command: "HGETALL",
                        reply: format!("odd number of elements ({})", flat.len()),
                    });
                }
                let mut pairs = Vec::with_capacity(flat.len() / 2);
                let mut iter = flat.into_iter();
                while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
                    pairs.push((field, value));
                }
                Ok(StoreValue::Hash(pairs))
            }
        }
    }

    fn reported_key_count(&self) -> Result<u64, StoreError> {
        match self.command("INFO", &[b"keyspace"])? {
            RespValue::BulkString(Some(info)) => Ok(parse_keyspace_count(
                &String::from_utf8_lossy(&info),
                self.config.db,
            )),
            other => Err(StoreError::UnexpectedReply {
                command: "INFO",
                reply: other.describe(),
            }),
        }
    }
}

/// Names for one enumeration, plus the original bytes behind escaped names
pub(crate) struct KeyNames {
    pub names: Vec<String>,
    pub binary: AHashMap<String, Vec<u8>>,
}

/// Give every distinct raw key a distinct name. UTF-8 keys keep their text;
/// the rest are escaped and, on collision with any other name, suffixed.
pub(crate) fn name_keys(raw_keys: Vec<Vec<u8>>) -> KeyNames {
    let decoded: Vec<Result<String, Vec<u8>>> = raw_keys
        .into_iter()
        .map(|raw| String::from_utf8(raw).map_err(|e| e.into_bytes()))
        .collect();

    let mut binary = AHashMap::new();
    if decoded.iter().all(Result::is_ok) {
        let names = decoded.into_iter().filter_map(Result::ok).collect();
        return KeyNames { names, binary };
    }

    let mut taken: AHashSet<String> = decoded
        .iter()
        .filter_map(|key| key.as_ref().ok().cloned())
        .collect();
    let names = decoded
        .into_iter()
        .map(|key| match key {
            Ok(name) => name,
            Err(raw) => {
                let escaped = escape_key(&raw);
                let mut name = escaped.clone();
                let mut suffix = 1;
                while taken.contains(&name) {
                    name = format!("{}#{}", escaped, suffix);
                    suffix += 1;
                }
                taken.insert(name.clone());
                debug!(key = %name, "Escaped non-UTF-8 key");
                binary.insert(name.clone(), raw);
                name
            }
        })
        .collect();
    KeyNames { names, binary }
}

/// Render `raw` as text, writing each byte of an invalid sequence as `\xNN`
pub(crate) fn escape_key(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    let mut rest = raw;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let bad = e.error_len().unwrap_or(after.len());
                for byte in &after[..bad] {
                    let _ = write!(out, "\\x{:02x}", byte);
                }
                rest = &after[bad..];
            }
        }
    }
}

/// Extract `keys=<n>` for `db<index>` from an `INFO keyspace` section.
/// A database with no keys has no line at all, which reads as zero.
pub(crate) fn parse_keyspace_count(info: &str, db: u32) -> u64 {
    let prefix = format!("db{}:", db);
    info.lines()
        .filter_map(|line| line.trim().strip_prefix(prefix.as_str()))
        .flat_map(|fields| fields.split(','))
        .filter_map(|field| field.strip_prefix("keys="))
        .find_map(|n| n.parse().ok())
        .unwrap_or(0)
}
