//! Relay configuration
//!
//! Built-in defaults, optionally overridden by a TOML config file, in turn
//! overridden by CLI flags (applied by the caller). The file shape:
//!
//! ```toml
//! [serial]
//! device = "/dev/ttyUSB0"
//! baud = 115200
//! timeout_ms = 100
//!
//! [http]
//! bind = "0.0.0.0"
//! port = 5000
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::RelayError;
use crate::serial::PortConfig;

pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD: u32 = 115_200;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_HTTP_BIND: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Fully-resolved relay configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub serial: SerialConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SerialConfig {
    /// Serial device path (e.g., /dev/ttyUSB0, /dev/ttyACM0)
    pub device: String,
    /// Baud rate
    pub baud: u32,
    /// Read timeout; bounds how long the ingest loop blocks per read
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    /// Bind address
    pub bind: String,
    /// Listen port
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig {
                device: DEFAULT_DEVICE.to_string(),
                baud: DEFAULT_BAUD,
                timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            },
            http: HttpConfig {
                bind: DEFAULT_HTTP_BIND.to_string(),
                port: DEFAULT_HTTP_PORT,
            },
        }
    }
}

impl RelayConfig {
    /// Load defaults merged with the given config file.
    pub fn from_file(path: &Path) -> Result<Self, RelayError> {
        let raw = fs::read_to_string(path).map_err(|source| RelayError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        let file: FileConfig =
            toml::from_str(&raw).map_err(|source| RelayError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self::default().merged(file))
    }

    /// Build the serial port configuration for the ingest loop.
    pub fn port_config(&self) -> PortConfig {
        PortConfig::new(&self.serial.device)
            .with_baud_rate(self.serial.baud)
            .with_timeout(self.serial.timeout)
    }

    fn merged(mut self, file: FileConfig) -> Self {
        if let Some(device) = file.serial.device {
            self.serial.device = device;
        }
        if let Some(baud) = file.serial.baud {
            self.serial.baud = baud;
        }
        if let Some(ms) = file.serial.timeout_ms {
            self.serial.timeout = Duration::from_millis(ms);
        }
        if let Some(bind) = file.http.bind {
            self.http.bind = bind;
        }
        if let Some(port) = file.http.port {
            self.http.port = port;
        }
        self
    }
}

/// Raw file shape; every field optional so partial files work.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    serial: SerialSection,
    #[serde(default)]
    http: HttpSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SerialSection {
    device: Option<String>,
    baud: Option<u32>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct HttpSection {
    bind: Option<String>,
    port: Option<u16>,
}
