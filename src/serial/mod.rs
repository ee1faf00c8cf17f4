//! Serial side of the relay
//!
//! This module provides:
//! - Serial port configuration, connection, and discovery
//! - The ingest loop that turns the device's byte stream into published lines

pub mod ingest;
pub mod port;

pub use ingest::{IngestLoop, LineFramer, LineLog};
pub use port::{PortConfig, SerialConnection};
