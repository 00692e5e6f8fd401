//! Listener configuration, loadable from a TOML file.
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Tunables for a [`Listener`](crate::srt::Listener).
///
/// Defaults mirror the listener defaults named in the data model: an MTU of 1500, a flow
/// window of `0x2000`, and a two-slot accept queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mtu: u32,
    #[serde(rename = "flow-window")]
    pub flow_window: u32,
    #[serde(rename = "accept-queue")]
    pub accept_queue: usize,
    /// Only `0` (plaintext) is accepted by the handshake engine; any other value is rejected
    /// with `BadEncryption` before a connection is ever created.
    pub encryption: u16,
    /// ASCII congestion-control tag advertised in handshake extension type 6. `"file"` reversed
    /// ("elif") matches the reference SRT library's file-transmission mode.
    pub congestion: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mtu: 1500,
            flow_window: 0x2000,
            accept_queue: 2,
            encryption: 0,
            congestion: "file".to_string(),
        }
    }
}

impl Config {
    pub fn from_file<P>(path: P) -> Result<Self, Box<dyn std::error::Error>>
    where
        P: AsRef<Path>,
    {
        let mut file = File::open(path)?;

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        Ok(toml::from_slice(&buf)?)
    }
}
