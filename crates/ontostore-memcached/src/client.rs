// crates/ontostore-memcached/src/client.rs
// ============================================================================
// Module: Memcached Client
// Description: Cache engine and backend for memcached servers.
// Purpose: Serve `memcached` resources over TCP or Unix sockets.
// Dependencies: ontostore-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! [`MemcachedEngine`] turns cache targets into a [`MemcachedBackend`].
//! Server connections open lazily on first use and are dropped after any
//! transport or protocol failure; the next request reconnects. Requests are
//! never retried.
//! Invariants:
//! - A key always routes to the same server for a fixed target list.
//! - Server failures surface as cache errors carrying libmemcached codes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io;
use std::io::BufReader;
use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::net::ToSocketAddrs;
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::sync::Mutex;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use ontostore_core::CacheBackend;
use ontostore_core::CacheEngine;
use ontostore_core::CacheKey;
use ontostore_core::CacheTarget;
use ontostore_core::Outcome;
use ontostore_core::ParamKey;
use ontostore_core::ParameterSet;
use ontostore_core::Protocol;
use ontostore_core::ResourceError;
use serde_json::Value;
use serde_json::json;
use tracing::debug;
use tracing::warn;

use crate::protocol::CONNECTION_FAILURE;
use crate::protocol::HOST_LOOKUP_FAILURE;
use crate::protocol::MemcachedError;
use crate::protocol::NO_SERVERS;
use crate::protocol::PROTOCOL_ERROR;
use crate::protocol::Request;
use crate::protocol::encode_key;
use crate::protocol::read_delete_reply;
use crate::protocol::read_ok_reply;
use crate::protocol::read_stats;
use crate::protocol::read_store_reply;
use crate::protocol::read_value;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Port used when a TCP target names none.
pub const DEFAULT_PORT: u16 = 11211;
/// DSN option holding the connect timeout in milliseconds.
pub const OPTION_CONNECT_TIMEOUT_MS: &str = "connect_timeout_ms";
/// DSN option holding the socket read/write timeout in milliseconds; `0`
/// disables the timeout.
pub const OPTION_IO_TIMEOUT_MS: &str = "io_timeout_ms";
/// Default connect timeout.
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1_000;
/// Default socket read/write timeout.
const DEFAULT_IO_TIMEOUT_MS: u64 = 5_000;
/// Largest expiration memcached treats as relative seconds.
const MAX_RELATIVE_EXPTIME: u32 = 2_592_000;

/// Socket settings taken from DSN options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemcachedOptions {
    /// Connect timeout per resolved address.
    pub connect_timeout: Duration,
    /// Read/write timeout; `None` blocks indefinitely.
    pub io_timeout: Option<Duration>,
}

impl Default for MemcachedOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            io_timeout: Some(Duration::from_millis(DEFAULT_IO_TIMEOUT_MS)),
        }
    }
}

impl MemcachedOptions {
    /// Reads socket settings from the options parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Configuration`] for non-numeric values or a
    /// zero connect timeout.
    pub fn from_params(params: &ParameterSet) -> Result<Self, ResourceError> {
        let connect = option_millis(params, OPTION_CONNECT_TIMEOUT_MS, DEFAULT_CONNECT_TIMEOUT_MS)?;
        if connect == 0 {
            return Err(ResourceError::configuration(format!("{OPTION_CONNECT_TIMEOUT_MS} must be positive")));
        }
        let io = option_millis(params, OPTION_IO_TIMEOUT_MS, DEFAULT_IO_TIMEOUT_MS)?;
        Ok(Self {
            connect_timeout: Duration::from_millis(connect),
            io_timeout: (io > 0).then(|| Duration::from_millis(io)),
        })
    }
}

/// Parses a millisecond option, falling back to `default`.
fn option_millis(params: &ParameterSet, name: &str, default: u64) -> Result<u64, ResourceError> {
    params.option(name).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<u64>()
            .map_err(|_| ResourceError::configuration(format!("invalid {name} option: {raw}")))
    })
}

/// Converts a TTL in seconds into a memcached expiration.
///
/// Memcached reads expirations above thirty days as Unix timestamps, so
/// longer TTLs are sent as absolute times.
fn wire_exptime(ttl: u32) -> u32 {
    if ttl <= MAX_RELATIVE_EXPTIME {
        return ttl;
    }
    let now = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_secs());
    u32::try_from(now.saturating_add(u64::from(ttl))).unwrap_or(u32::MAX)
}

// ============================================================================
// SECTION: Transport
// ============================================================================

/// Socket to one server.
enum Stream {
    /// TCP connection.
    Tcp(TcpStream),
    /// Unix domain socket connection.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    /// Connects to `target` and applies socket timeouts.
    fn connect(target: &CacheTarget, options: &MemcachedOptions) -> Result<Self, MemcachedError> {
        let stream = match target {
            CacheTarget::Tcp {
                host,
                port,
            } => Self::Tcp(connect_tcp(host, port.unwrap_or(DEFAULT_PORT), options.connect_timeout)?),
            #[cfg(unix)]
            CacheTarget::Socket(path) => Self::Unix(UnixStream::connect(path).map_err(|err| {
                MemcachedError::new(CONNECTION_FAILURE, format!("cannot connect to {}: {err}", path.display()))
            })?),
            #[cfg(not(unix))]
            CacheTarget::Socket(path) => {
                return Err(MemcachedError::new(
                    CONNECTION_FAILURE,
                    format!("unix sockets are not supported: {}", path.display()),
                ));
            }
        };
        stream
            .set_timeouts(options.io_timeout)
            .map_err(|err| MemcachedError::new(CONNECTION_FAILURE, format!("cannot set timeouts: {err}")))?;
        Ok(stream)
    }

    /// Applies read and write timeouts.
    fn set_timeouts(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => {
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(timeout)
            }
            #[cfg(unix)]
            Self::Unix(stream) => {
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(timeout)
            }
        }
    }
}

/// Resolves `host` and connects to the first reachable address.
fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, MemcachedError> {
    let authority = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    let addresses: Vec<SocketAddr> = authority
        .to_socket_addrs()
        .map_err(|err| MemcachedError::new(HOST_LOOKUP_FAILURE, format!("cannot resolve {authority}: {err}")))?
        .collect();
    let mut last_error = format!("{authority} resolved to no addresses");
    for address in addresses {
        match TcpStream::connect_timeout(&address, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true).map_err(|err| {
                    MemcachedError::new(CONNECTION_FAILURE, format!("cannot configure {address}: {err}"))
                })?;
                return Ok(stream);
            }
            Err(err) => last_error = format!("cannot connect to {address}: {err}"),
        }
    }
    Err(MemcachedError::new(CONNECTION_FAILURE, last_error))
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Cache engine for the `memcached` protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemcachedEngine;

impl MemcachedEngine {
    /// Creates the engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CacheEngine for MemcachedEngine {
    fn protocol(&self) -> Protocol {
        Protocol::Memcached
    }

    fn validate(&self, targets: &[CacheTarget], params: &ParameterSet) -> Result<(), ResourceError> {
        MemcachedOptions::from_params(params)?;
        for target in targets {
            if let CacheTarget::Socket(path) = target
                && !path.is_absolute()
            {
                return Err(ResourceError::configuration(format!(
                    "memcached socket path {} must be absolute",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    fn connect(
        &self,
        targets: &[CacheTarget],
        params: &ParameterSet,
    ) -> Result<Box<dyn CacheBackend>, ResourceError> {
        let options = MemcachedOptions::from_params(params)?;
        let servers: Vec<Server> = targets
            .iter()
            .map(|target| Server {
                target: target.clone(),
                connection: Mutex::new(None),
            })
            .collect();
        debug!(servers = servers.len(), "memcached backend ready");
        Ok(Box::new(MemcachedBackend {
            servers,
            options,
            persistent_id: params.text(ParamKey::PersistentId).map(str::to_string),
        }))
    }
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// Configured server and its lazily opened connection.
struct Server {
    /// Server address.
    target: CacheTarget,
    /// Buffered connection, absent until first use or after a failure.
    connection: Mutex<Option<BufReader<Stream>>>,
}

/// Live memcached handle spreading keys across servers.
pub struct MemcachedBackend {
    /// Servers in target order.
    servers: Vec<Server>,
    /// Socket settings.
    options: MemcachedOptions,
    /// Persistent connection id reported in stats.
    persistent_id: Option<String>,
}

impl MemcachedBackend {
    /// Returns the server owning `key`.
    fn server_for(&self, key: &CacheKey) -> Result<&Server, MemcachedError> {
        self.servers
            .get(key.shard(self.servers.len()))
            .ok_or_else(|| MemcachedError::new(NO_SERVERS, "no memcached servers configured"))
    }

    /// Sends `request` to `server` and parses the reply with `read`.
    ///
    /// The connection is kept for reuse unless the failure leaves it in an
    /// unknown state.
    fn exchange<T>(
        &self,
        server: &Server,
        request: &Request<'_>,
        read: impl FnOnce(&mut BufReader<Stream>) -> Result<T, MemcachedError>,
    ) -> Result<T, MemcachedError> {
        let mut guard = server
            .connection
            .lock()
            .map_err(|_| MemcachedError::new(CONNECTION_FAILURE, "memcached connection mutex poisoned"))?;
        let mut connection = match guard.take() {
            Some(connection) => connection,
            None => {
                debug!(server = %server.target, "opening memcached connection");
                BufReader::new(Stream::connect(&server.target, &self.options).inspect_err(|err| {
                    warn!(server = %server.target, code = err.code, error = %err.message, "memcached connect failed");
                })?)
            }
        };
        let result = request.send(connection.get_mut()).and_then(|()| read(&mut connection));
        match &result {
            Err(err) if err.drops_connection() => {
                warn!(
                    server = %server.target,
                    code = err.code,
                    error = %err.message,
                    "dropping memcached connection"
                );
            }
            _ => *guard = Some(connection),
        }
        result
    }

    /// Fetches the `stats` table of every server in target order.
    fn server_stats(&self) -> Result<Vec<(&Server, BTreeMap<String, String>)>, MemcachedError> {
        self.servers
            .iter()
            .map(|server| self.exchange(server, &Request::Stats, read_stats).map(|stats| (server, stats)))
            .collect()
    }
}

impl CacheBackend for MemcachedBackend {
    fn set(&self, key: &CacheKey, value: &[u8], ttl: u32) -> Result<(), ResourceError> {
        let encoded = encode_key(key);
        let request = Request::Set {
            key: &encoded,
            exptime: wire_exptime(ttl),
            value,
        };
        let server = self.server_for(key)?;
        self.exchange(server, &request, read_store_reply).map_err(ResourceError::from)
    }

    fn get(&self, key: &CacheKey) -> Outcome<Vec<u8>> {
        let encoded = encode_key(key);
        let result = self.server_for(key).and_then(|server| {
            self.exchange(
                server,
                &Request::Get {
                    key: &encoded,
                },
                |reader| read_value(reader, &encoded),
            )
        });
        Outcome::from(result.map_err(ResourceError::from))
    }

    fn delete(&self, key: &CacheKey) -> Outcome<()> {
        let encoded = encode_key(key);
        let result = self.server_for(key).and_then(|server| {
            self.exchange(
                server,
                &Request::Delete {
                    key: &encoded,
                },
                read_delete_reply,
            )
        });
        Outcome::from(result.map(|deleted| deleted.then_some(())).map_err(ResourceError::from))
    }

    fn flush(&self) -> Result<(), ResourceError> {
        for server in &self.servers {
            self.exchange(server, &Request::FlushAll, read_ok_reply)?;
        }
        Ok(())
    }

    fn item_count(&self) -> Result<u64, ResourceError> {
        let mut total: u64 = 0;
        for (server, stats) in self.server_stats()? {
            let items = stats.get("curr_items").and_then(|raw| raw.parse::<u64>().ok()).ok_or_else(|| {
                MemcachedError::new(PROTOCOL_ERROR, format!("{} reported no curr_items", server.target))
            })?;
            total = total.saturating_add(items);
        }
        Ok(total)
    }

    fn stats(&self) -> Result<Value, ResourceError> {
        let servers: Vec<Value> = self
            .server_stats()?
            .into_iter()
            .map(|(server, stats)| {
                json!({
                    "target": server.target.to_string(),
                    "stats": stats,
                })
            })
            .collect();
        Ok(json!({
            "engine": Protocol::Memcached.scheme(),
            "persistent_id": self.persistent_id,
            "servers": servers,
        }))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
