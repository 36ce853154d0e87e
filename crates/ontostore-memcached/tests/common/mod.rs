// crates/ontostore-memcached/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: In-process memcached stand-in for client tests.
// Purpose: Exercise the client against a real socket without a daemon.
// Dependencies: std
// ============================================================================

//! ## Overview
//! [`FakeMemcached`] speaks enough of the text protocol for the client:
//! `set`, `get`, `delete`, `flush_all`, and `stats`. A few reserved keys
//! trigger failure replies:
//! - `s:reject` answers `NOT_STORED`
//! - `s:full` answers `SERVER_ERROR`
//! - `s:hangup` closes the connection without replying

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::net::TcpListener;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

// ============================================================================
// SECTION: Server
// ============================================================================

/// Shared server state.
#[derive(Default)]
struct FakeState {
    /// Stored values by wire key.
    items: BTreeMap<String, Vec<u8>>,
    /// Accepted connections.
    connections: usize,
    /// Expirations from the latest `set` per wire key.
    exptimes: BTreeMap<String, u64>,
}

/// Memcached stand-in bound to a loopback port.
pub struct FakeMemcached {
    /// Listening address.
    address: SocketAddr,
    /// State shared with connection threads.
    state: Arc<Mutex<FakeState>>,
}

impl FakeMemcached {
    /// Starts the server on an ephemeral port.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake memcached");
        let address = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(FakeState::default()));
        let accept_state = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else {
                    return;
                };
                accept_state.lock().unwrap().connections += 1;
                let state = Arc::clone(&accept_state);
                thread::spawn(move || serve(stream, &state));
            }
        });
        Self {
            address,
            state,
        }
    }

    /// Returns the `host:port` target string.
    pub fn target(&self) -> String {
        self.address.to_string()
    }

    /// Returns a DSN naming this server.
    pub fn dsn(&self) -> String {
        format!("memcached://{}", self.address)
    }

    /// Returns the number of accepted connections.
    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }

    /// Returns the stored wire keys in order.
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().unwrap().items.keys().cloned().collect()
    }

    /// Returns the expiration last sent for `key`.
    pub fn exptime(&self, key: &str) -> Option<u64> {
        self.state.lock().unwrap().exptimes.get(key).copied()
    }
}

/// Returns a loopback address nothing listens on.
pub fn closed_target() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);
    address.to_string()
}

/// Handles one client connection until it closes.
fn serve(stream: TcpStream, state: &Mutex<FakeState>) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        let words: Vec<&str> = line.split_ascii_whitespace().collect();
        let reply = match words.as_slice() {
            ["set", key, _flags, exptime, length] => {
                let length: usize = length.parse().unwrap();
                let mut block = vec![0_u8; length + 2];
                reader.read_exact(&mut block).unwrap();
                block.truncate(length);
                match *key {
                    "s:reject" => b"NOT_STORED\r\n".to_vec(),
                    "s:full" => b"SERVER_ERROR out of memory storing object\r\n".to_vec(),
                    _ => {
                        let mut state = state.lock().unwrap();
                        state.items.insert((*key).to_string(), block);
                        state.exptimes.insert((*key).to_string(), exptime.parse().unwrap());
                        b"STORED\r\n".to_vec()
                    }
                }
            }
            ["get", "s:hangup"] => return,
            ["get", key] => match state.lock().unwrap().items.get(*key) {
                Some(value) => {
                    let mut reply = format!("VALUE {key} 0 {}\r\n", value.len()).into_bytes();
                    reply.extend_from_slice(value);
                    reply.extend_from_slice(b"\r\nEND\r\n");
                    reply
                }
                None => b"END\r\n".to_vec(),
            },
            ["delete", key] => {
                if state.lock().unwrap().items.remove(*key).is_some() {
                    b"DELETED\r\n".to_vec()
                } else {
                    b"NOT_FOUND\r\n".to_vec()
                }
            }
            ["flush_all"] => {
                state.lock().unwrap().items.clear();
                b"OK\r\n".to_vec()
            }
            ["stats"] => {
                let items = state.lock().unwrap().items.len();
                format!("STAT pid 4242\r\nSTAT curr_items {items}\r\nEND\r\n").into_bytes()
            }
            _ => b"ERROR\r\n".to_vec(),
        };
        if writer.write_all(&reply).is_err() {
            return;
        }
    }
}
