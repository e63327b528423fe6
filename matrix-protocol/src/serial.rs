//! Serial port transport.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortInfo, SerialPortType, StopBits};

use crate::transport::{idle_on_timeout, ReadOutcome, Transport, DEFAULT_POLL_INTERVAL};
use crate::ProtocolError;

/// Baud rate the display firmware listens at
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

const READ_CHUNK: usize = 256;

/// A display attached to a serial port (8N1, no flow control)
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    path: String,
    buf: [u8; READ_CHUNK],
}

impl SerialTransport {
    /// Open a serial port with the default poll interval
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, ProtocolError> {
        Self::open_with_poll(path, baud_rate, DEFAULT_POLL_INTERVAL)
    }

    /// Open a serial port; `poll` bounds each read
    pub fn open_with_poll(path: &str, baud_rate: u32, poll: Duration) -> Result<Self, ProtocolError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(poll)
            .open()?;
        log::info!("Opened serial port {} at {} baud", path, baud_rate);
        Ok(SerialTransport {
            port,
            path: path.to_string(),
            buf: [0; READ_CHUNK],
        })
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read(&mut self) -> Result<ReadOutcome, ProtocolError> {
        match self.port.read(&mut self.buf) {
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(n) => Ok(ReadOutcome::Data(self.buf[..n].to_vec())),
            Err(e) => idle_on_timeout(e),
        }
    }

    fn describe(&self) -> String {
        format!("serial:{}", self.path)
    }
}

/// Serial ports present on this machine
pub fn available_ports() -> Result<Vec<SerialPortInfo>, ProtocolError> {
    Ok(serialport::available_ports()?)
}

/// One-line description of a port for listings
pub fn describe_port(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => format!(
            "{} (USB {:04x}:{:04x}{})",
            info.port_name,
            usb.vid,
            usb.pid,
            usb.product
                .as_deref()
                .map(|p| format!(" {}", p))
                .unwrap_or_default()
        ),
        SerialPortType::BluetoothPort => format!("{} (Bluetooth)", info.port_name),
        SerialPortType::PciPort => format!("{} (PCI)", info.port_name),
        SerialPortType::Unknown => info.port_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    #[test]
    fn test_describe_usb_port() {
        let info = SerialPortInfo {
            port_name: "/dev/ttyACM0".to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x2e8a,
                pid: 0x000a,
                serial_number: None,
                manufacturer: None,
                product: Some("Pico".to_string()),
            }),
        };
        assert_eq!(describe_port(&info), "/dev/ttyACM0 (USB 2e8a:000a Pico)");
    }

    #[test]
    fn test_open_missing_port_fails() {
        assert!(SerialTransport::open("/dev/does-not-exist-matrix", DEFAULT_BAUD_RATE).is_err());
    }
}
