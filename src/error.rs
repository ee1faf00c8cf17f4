//! Error types for the relay's fallible seams.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to open serial port {path}")]
    PortOpen {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("failed to read config file {path}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
