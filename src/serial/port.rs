//! Serial port configuration and connection management
//!
//! Handles USB serial port discovery and the read-side connection the
//! ingest loop runs on.

use std::collections::HashMap;
use std::io::{self, Read};
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use once_cell::sync::Lazy;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::RelayError;

/// Default baud rate for the microcontroller's serial output
pub const DEFAULT_BAUD: u32 = 115_200;

/// Known USB-to-serial adapter chips by vendor ID
static KNOWN_ADAPTERS: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(0x0403, "FTDI");
    m.insert(0x10c4, "Silicon Labs CP210x");
    m.insert(0x1a86, "WCH CH340/CH341");
    m.insert(0x067b, "Prolific PL2303");
    m
});

/// Configuration for a serial port connection
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial port path (e.g., /dev/ttyUSB0, /dev/ttyACM0)
    pub port_path: String,
    /// Baud rate (default: 115200)
    pub baud_rate: u32,
    /// Data bits (default: 8)
    pub data_bits: DataBits,
    /// Parity (default: None)
    pub parity: Parity,
    /// Stop bits (default: 1)
    pub stop_bits: StopBits,
    /// Flow control (default: None)
    pub flow_control: FlowControl,
    /// Read timeout
    pub timeout: Duration,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port_path: String::from("/dev/ttyUSB0"),
            baud_rate: DEFAULT_BAUD,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout: Duration::from_millis(100),
        }
    }
}

impl PortConfig {
    /// Create a new configuration with default settings
    pub fn new(port_path: &str) -> Self {
        Self {
            port_path: port_path.to_string(),
            ..Default::default()
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// An opened serial connection the ingest loop reads from
pub struct SerialConnection {
    port: Box<dyn SerialPort>,
    config: PortConfig,
}

impl SerialConnection {
    /// Open a serial connection with the given configuration
    pub fn open(config: PortConfig) -> Result<Self, RelayError> {
        let port = serialport::new(&config.port_path, config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .timeout(config.timeout)
            .open()
            .map_err(|source| RelayError::PortOpen {
                path: config.port_path.clone(),
                source,
            })?;

        Ok(Self { port, config })
    }

    /// Get the port configuration
    pub fn config(&self) -> &PortConfig {
        &self.config
    }
}

impl Read for SerialConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

/// Information about a detected serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub path: String,
    pub port_type: PortType,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

impl PortInfo {
    /// Adapter chip name if the vendor ID is a known USB-to-serial vendor
    pub fn adapter_chip(&self) -> Option<&'static str> {
        self.vid.and_then(|vid| KNOWN_ADAPTERS.get(&vid).copied())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PortType {
    UsbSerial,
    PciSerial,
    Bluetooth,
    Unknown,
}

impl std::fmt::Display for PortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortType::UsbSerial => write!(f, "USB Serial"),
            PortType::PciSerial => write!(f, "PCI Serial"),
            PortType::Bluetooth => write!(f, "Bluetooth"),
            PortType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// List all available serial ports
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().with_context(|| "Failed to enumerate serial ports")?;

    let port_infos: Vec<PortInfo> = ports
        .into_iter()
        .map(|p| {
            let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    PortType::UsbSerial,
                    info.manufacturer,
                    info.product,
                    info.serial_number,
                    Some(info.vid),
                    Some(info.pid),
                ),
                serialport::SerialPortType::PciPort => {
                    (PortType::PciSerial, None, None, None, None, None)
                }
                serialport::SerialPortType::BluetoothPort => {
                    (PortType::Bluetooth, None, None, None, None, None)
                }
                serialport::SerialPortType::Unknown => {
                    (PortType::Unknown, None, None, None, None, None)
                }
            };

            PortInfo {
                path: p.port_name,
                port_type,
                manufacturer,
                product,
                serial_number,
                vid,
                pid,
            }
        })
        .collect();

    Ok(port_infos)
}

/// Print formatted list of available serial ports
pub fn print_ports() -> Result<()> {
    let ports = list_ports()?;

    if ports.is_empty() {
        println!("{}", "No serial ports found".yellow());
        println!("\n{}", "Troubleshooting tips:".cyan().bold());
        println!("  1. Connect the microcontroller's USB-to-serial adapter");
        println!("  2. Check if the device is recognized: ls -la /dev/ttyUSB* /dev/ttyACM*");
        println!("  3. Add your user to the 'dialout' group: sudo usermod -aG dialout $USER");
        println!("  4. Check dmesg for connection events: dmesg | tail -20");
        return Ok(());
    }

    println!("{}", "Available Serial Ports:".green().bold());
    println!("{}", "=".repeat(60));

    for port in ports {
        println!("\n{}: {}", "Port".cyan(), port.path.white().bold());
        println!("  Type: {}", port.port_type);

        if let Some(chip) = port.adapter_chip() {
            println!("  Adapter: {}", chip);
        }
        if let Some(ref mfg) = port.manufacturer {
            println!("  Manufacturer: {}", mfg);
        }
        if let Some(ref prod) = port.product {
            println!("  Product: {}", prod);
        }
        if let Some(ref sn) = port.serial_number {
            println!("  Serial: {}", sn);
        }
        if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            println!("  VID:PID: {:04x}:{:04x}", vid, pid);
        }
    }

    println!("\n{}", "=".repeat(60));
    println!(
        "{}",
        "Use: imu-relay serve -d <PORT> to start relaying".yellow()
    );

    Ok(())
}

/// Auto-detect likely USB-to-serial adapters
pub fn detect_usb_ports() -> Result<Vec<PortInfo>> {
    let ports = list_ports()?;

    // Common chips: FTDI, CP210x, CH340, PL2303
    let usb_ports: Vec<PortInfo> = ports
        .into_iter()
        .filter(|p| {
            if p.port_type != PortType::UsbSerial {
                return false;
            }

            if p.adapter_chip().is_some() {
                return true;
            }

            // Fallback: check product name for common keywords
            if let Some(ref prod) = p.product {
                let prod_lower = prod.to_lowercase();
                return prod_lower.contains("serial")
                    || prod_lower.contains("uart")
                    || prod_lower.contains("usb")
                    || prod_lower.contains("ftdi")
                    || prod_lower.contains("ch340");
            }

            false
        })
        .collect();

    Ok(usb_ports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PortConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.port_path, "/dev/ttyUSB0");
    }

    #[test]
    fn test_config_builder() {
        let config = PortConfig::new("/dev/ttyACM0")
            .with_baud_rate(9600)
            .with_timeout(Duration::from_secs(1));

        assert_eq!(config.port_path, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_known_adapter_lookup() {
        let info = PortInfo {
            path: "/dev/ttyUSB0".to_string(),
            port_type: PortType::UsbSerial,
            manufacturer: None,
            product: None,
            serial_number: None,
            vid: Some(0x0403),
            pid: Some(0x6001),
        };
        assert_eq!(info.adapter_chip(), Some("FTDI"));

        let unknown = PortInfo { vid: Some(0xffff), ..info };
        assert_eq!(unknown.adapter_chip(), None);
    }
}
