use std::thread;
use std::time::{Duration, Instant};

use serialport::SerialPortType;

use super::{ConnectError, Result, SerialDeviceInfo, SerialError, SerialPortIO};

/// Timeout applied to each underlying read call on a real port.
pub const PER_READ_TIMEOUT: Duration = Duration::from_millis(1000);
/// Interval between checks for incoming bytes while waiting for a line.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

const READ_CHUNK: usize = 256;
/// Longest run of bytes kept while waiting for a `\n`.
const MAX_LINE_LEN: usize = 1024;

/// Owns the serial channel to the filter wheel.
///
/// Line assembly happens here: bytes are accumulated until a `\n` shows up,
/// so a reply split across several reads still comes back as one line.
pub struct SerialInterface {
    port: Option<Box<dyn SerialPortIO>>,
    port_name: Option<String>,
    partial: Vec<u8>,
    poll_interval: Duration,
}

impl SerialInterface {
    pub fn new() -> Self {
        Self {
            port: None,
            port_name: None,
            partial: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// List serial ports the OS currently reports.
    pub fn discover_ports() -> std::result::Result<Vec<SerialDeviceInfo>, serialport::Error> {
        let ports = serialport::available_ports()?;
        let devices = ports
            .into_iter()
            .map(|port| match port.port_type {
                SerialPortType::UsbPort(usb_info) => SerialDeviceInfo {
                    port_name: port.port_name,
                    vid: Some(usb_info.vid),
                    pid: Some(usb_info.pid),
                    serial_number: usb_info.serial_number,
                    manufacturer: usb_info.manufacturer,
                    product: usb_info.product,
                },
                _ => SerialDeviceInfo {
                    port_name: port.port_name,
                    vid: None,
                    pid: None,
                    serial_number: None,
                    manufacturer: None,
                    product: None,
                },
            })
            .collect();

        Ok(devices)
    }

    /// Open `port_name` at `baud_rate` and flush whatever the device left behind.
    pub fn connect(
        &mut self,
        port_name: &str,
        baud_rate: u32,
    ) -> std::result::Result<(), ConnectError> {
        if port_name.trim().is_empty() {
            return Err(ConnectError::InvalidSettings("port name is empty".to_string()));
        }
        if baud_rate == 0 {
            return Err(ConnectError::InvalidSettings(
                "baud rate must be positive".to_string(),
            ));
        }

        // A reconnect replaces the old handle; never keep two open.
        self.disconnect();

        log::info!("Opening {} at {} baud", port_name, baud_rate);
        let port = serialport::new(port_name, baud_rate)
            .timeout(PER_READ_TIMEOUT)
            .open()
            .map_err(|source| ConnectError::PortUnavailable {
                port: port_name.to_string(),
                source,
            })?;

        self.attach(port_name, Box::new(port))
    }

    /// Adopt an already-open channel. Stale input is cleared before first use.
    pub fn attach(
        &mut self,
        port_name: impl Into<String>,
        mut io: Box<dyn SerialPortIO>,
    ) -> std::result::Result<(), ConnectError> {
        let port_name = port_name.into();
        self.disconnect();

        io.discard_input().map_err(|source| ConnectError::Io {
            port: port_name.clone(),
            source,
        })?;

        log::info!("Connected to filter wheel on {}", port_name);
        self.port = Some(io);
        self.port_name = Some(port_name);
        self.partial.clear();
        Ok(())
    }

    /// Close the channel. Returns `false` when there was nothing to close.
    pub fn disconnect(&mut self) -> bool {
        self.partial.clear();
        match self.port.take() {
            Some(_) => {
                if let Some(name) = self.port_name.take() {
                    log::info!("Disconnected from {}", name);
                }
                true
            }
            None => {
                log::debug!("Disconnect requested but no port is open");
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    /// Drop buffered input, both in the OS and in the line assembler.
    pub fn clear_input(&mut self) -> Result<()> {
        let port = self.port.as_mut().ok_or(SerialError::NotConnected)?;
        port.discard_input()?;
        if !self.partial.is_empty() {
            log::debug!("Discarding {} stale bytes", self.partial.len());
            self.partial.clear();
        }
        Ok(())
    }

    /// Write `bytes` exactly as given; the caller supplies line terminators.
    pub fn write_line(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(SerialError::NotConnected)?;
        port.send_data(bytes)?;
        Ok(())
    }

    /// Wait up to `timeout` for one complete, non-empty line.
    ///
    /// `Ok(None)` means the deadline passed; that is an expected outcome, not
    /// an error. Blank lines are skipped without resetting the deadline.
    pub fn read_line_with_timeout(&mut self, timeout: Duration) -> Result<Option<String>> {
        if self.port.is_none() {
            return Err(SerialError::NotConnected);
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
            if self.partial.len() > MAX_LINE_LEN {
                log::warn!("Dropping {} bytes without a line terminator", self.partial.len());
                self.partial.clear();
            }

            let received = self.fill_partial()?;
            let now = Instant::now();
            if now >= deadline {
                // a complete line may have arrived with the last chunk
                if let Some(line) = self.take_line() {
                    return Ok(Some(line));
                }
                if !self.partial.is_empty() {
                    log::debug!(
                        "Read timed out with {} unterminated bytes buffered",
                        self.partial.len()
                    );
                }
                return Ok(None);
            }
            if received == 0 {
                thread::sleep(self.poll_interval.min(deadline - now));
            }
        }
    }

    fn fill_partial(&mut self) -> Result<usize> {
        let port = self.port.as_mut().ok_or(SerialError::NotConnected)?;
        let available = port.bytes_available()?;
        if available == 0 {
            return Ok(0);
        }

        let mut buffer = vec![0u8; available.min(READ_CHUNK)];
        let n = port.read_data(&mut buffer)?;
        self.partial.extend_from_slice(&buffer[..n]);
        Ok(n)
    }

    /// Pop the next non-blank line out of the assembler, if one is complete.
    fn take_line(&mut self) -> Option<String> {
        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.partial.drain(..=pos).collect();
            let line = decode_ascii(&raw);
            let line = line.trim();
            if !line.is_empty() {
                log::debug!("Received: {}", line);
                return Some(line.to_string());
            }
        }
        None
    }
}

impl Default for SerialInterface {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_ascii(raw: &[u8]) -> String {
    raw.iter()
        .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
        .collect()
}
