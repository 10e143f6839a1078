use std::io::{self, Read, Write};

use serialport::{ClearBuffer, SerialPort};

/// Raw byte channel underneath a [`SerialInterface`](super::SerialInterface).
///
/// Implemented for real ports opened through `serialport` and for the
/// scripted `MockPort` behind the `mock` feature.
pub trait SerialPortIO: Send {
    /// Write every byte of `data` and flush.
    fn send_data(&mut self, data: &[u8]) -> io::Result<()>;

    /// Number of bytes waiting in the receive buffer.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read whatever is available into `buffer`.
    fn read_data(&mut self, buffer: &mut [u8]) -> io::Result<usize>;

    /// Drop everything sitting in the receive buffer.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl SerialPortIO for Box<dyn SerialPort> {
    fn send_data(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data)?;
        self.flush()
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let pending = self.bytes_to_read()?;
        Ok(pending as usize)
    }

    fn read_data(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        match self.read(buffer) {
            Ok(n) => Ok(n),
            // per-read timeout, nothing arrived
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input)?;
        Ok(())
    }
}
