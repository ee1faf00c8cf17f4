//! Serial ingest loop
//!
//! Turns the device's raw byte stream into discrete lines and publishes the
//! latest one to the shared store. The loop runs on a dedicated thread under
//! a shared running flag; the port's read timeout bounds how long a shutdown
//! request waits for the loop to notice.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use log::{debug, error, info, warn};

use crate::serial::port::{PortConfig, SerialConnection};
use crate::store::LatestValue;

/// Bytes requested per device read
const READ_BUF_LEN: usize = 512;

/// Consecutive read failures tolerated before the loop gives up
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 10;

/// Delay before retrying a failed read
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accumulates bytes into newline-delimited lines.
///
/// Bytes are buffered until a `\n` arrives; the buffer is cleared on every
/// newline whether or not it held anything. Empty lines are dropped, and a
/// trailing `\r` (CRLF input) is stripped. Content is not inspected beyond
/// framing.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes in, get completed non-empty lines out.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' {
                if self.buf.last() == Some(&b'\r') {
                    self.buf.pop();
                }
                if !self.buf.is_empty() {
                    lines.push(String::from_utf8_lossy(&self.buf).into_owned());
                }
                self.buf.clear();
            } else {
                self.buf.push(byte);
            }
        }
        lines
    }
}

/// Timestamped file log of published lines.
pub struct LineLog {
    writer: BufWriter<File>,
}

impl LineLog {
    /// Create (truncating) the log file at the given path.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create line log: {}", path.display()))?;
        info!("logging received lines to {}", path.display());
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn append(&mut self, line: &str) -> io::Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        writeln!(self.writer, "[{}] {}", timestamp, line)?;
        self.writer.flush()
    }
}

/// The ingest task: owns the port configuration, a store handle, and the
/// shared running flag.
pub struct IngestLoop {
    port_config: PortConfig,
    store: LatestValue,
    running: Arc<AtomicBool>,
    line_log: Option<LineLog>,
}

impl IngestLoop {
    pub fn new(
        port_config: PortConfig,
        store: LatestValue,
        running: Arc<AtomicBool>,
        line_log: Option<LineLog>,
    ) -> Self {
        Self {
            port_config,
            store,
            running,
            line_log,
        }
    }

    /// Open the device and pump it until shutdown or stream end.
    ///
    /// An open failure disables ingest only: it is logged and the store keeps
    /// serving whatever it already holds.
    pub fn run(mut self) {
        let conn = match SerialConnection::open(self.port_config.clone()) {
            Ok(conn) => conn,
            Err(e) => {
                error!("serial ingest disabled: {:#}", anyhow::Error::from(e));
                return;
            }
        };

        info!(
            "listening on {} at {} baud",
            conn.config().port_path,
            conn.config().baud_rate
        );

        pump(conn, &self.store, &self.running, &mut self.line_log);
    }
}

/// Read loop shared by the real device and the tests.
///
/// Timeouts are idle polls of the running flag. `Ok(0)` ends the stream.
/// Other read errors are retried; after [`MAX_CONSECUTIVE_READ_ERRORS`] in a
/// row the loop gives up.
pub fn pump<R: Read>(
    mut reader: R,
    store: &LatestValue,
    running: &AtomicBool,
    line_log: &mut Option<LineLog>,
) {
    let mut framer = LineFramer::new();
    let mut buf = [0u8; READ_BUF_LEN];
    let mut consecutive_errors = 0u32;

    while running.load(Ordering::SeqCst) {
        match reader.read(&mut buf) {
            Ok(0) => {
                info!("serial stream ended");
                break;
            }
            Ok(n) => {
                consecutive_errors = 0;
                for line in framer.push_bytes(&buf[..n]) {
                    debug!("line received: {line}");
                    if let Some(log) = line_log {
                        if let Err(e) = log.append(&line) {
                            warn!("failed to write line log: {e}");
                        }
                    }
                    store.publish(line);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                consecutive_errors = 0;
            }
            Err(e) => {
                consecutive_errors += 1;
                warn!(
                    "serial read failed ({consecutive_errors}/{MAX_CONSECUTIVE_READ_ERRORS}): {e}"
                );
                if consecutive_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                    error!("giving up after {MAX_CONSECUTIVE_READ_ERRORS} consecutive read failures");
                    break;
                }
                thread::sleep(READ_RETRY_DELAY);
            }
        }
    }
}
