//! Robot communication client.

use std::io::{Read, Write};
use std::time::Duration;

use anyhow::Result;
use futures::executor::block_on;
use roomba_oi::commands::Command;
use roomba_oi::config::serial::MODE_CHANGE_DELAY_MS;
use roomba_oi::protocol::StreamFrame;
use roomba_oi::sensors::{OiMode, SensorRecord};
use roomba_oi::serial::{self, CommandWriter, LinkError, SensorStreamReader, SerialError};
use serialport::SerialPort as _;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// `serialport` device behind the library's async port trait.
pub struct HostSerial {
    port: Box<dyn serialport::SerialPort>,
}

impl serial::SerialPort for HostSerial {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(SerialError::Timeout),
            Err(_) => Err(SerialError::ReadError),
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), SerialError> {
        self.port.write_all(data).map_err(|_| SerialError::WriteError)
    }

    async fn flush(&mut self) -> Result<(), SerialError> {
        self.port.flush().map_err(|_| SerialError::WriteError)
    }
}

fn link(e: LinkError) -> anyhow::Error {
    anyhow::anyhow!("{}", e)
}

/// Find ports with a robot attached by asking each USB serial device for
/// its OI mode.
pub fn find_robot_ports(baud: u32) -> Result<Vec<String>> {
    let ports = serialport::available_ports()?;
    let mut robot_ports = Vec::new();

    for port_info in ports {
        // Create 2 cables enumerate as FTDI ttyUSB, some adapters as ttyACM
        let name = &port_info.port_name;
        if !name.contains("ttyUSB") && !name.contains("ttyACM") && !name.contains("usbserial") {
            continue;
        }

        if let Ok(mut client) = RobotClient::new(name, baud) {
            client.set_timeout(Duration::from_millis(500))?;
            if client.send(&Command::Start).is_ok() && client.oi_mode().is_ok() {
                robot_ports.push(name.clone());
            }
        }
    }

    Ok(robot_ports)
}

/// Resolve a port argument - returns the port path if not "auto", otherwise auto-detects.
pub fn resolve_port(port_arg: &str, baud: u32) -> Result<String> {
    if port_arg != "auto" {
        return Ok(port_arg.to_string());
    }
    match find_robot_ports(baud)?.into_iter().next() {
        Some(port) => Ok(port),
        None => anyhow::bail!("No robot found - check the cable and that the robot is awake"),
    }
}

/// Client for talking to a robot over its Open Interface port.
pub struct RobotClient {
    port: HostSerial,
    writer: CommandWriter,
    stream: SensorStreamReader,
}

impl RobotClient {
    /// Open the port at `baud_rate`.
    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(DEFAULT_TIMEOUT)
            .open()?;

        Ok(Self {
            port: HostSerial { port },
            writer: CommandWriter::new(),
            stream: SensorStreamReader::new(),
        })
    }

    /// Set the per-read timeout.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port.port.set_timeout(timeout)?;
        Ok(())
    }

    /// Discard anything buffered in either direction and any partial frame.
    pub fn clear_buffer(&mut self) -> Result<()> {
        self.port.port.clear(serialport::ClearBuffer::All)?;
        self.stream.reset();
        Ok(())
    }

    /// Read and discard bytes until the line goes quiet.
    pub fn drain_buffer(&mut self) -> Result<()> {
        self.port.port.set_timeout(Duration::from_millis(100))?;

        let mut buf = [0u8; 256];
        loop {
            match self.port.port.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }

        self.port.port.set_timeout(DEFAULT_TIMEOUT)?;
        self.stream.reset();
        Ok(())
    }

    /// Validate and send a command.
    pub fn send(&mut self, command: &Command) -> Result<()> {
        block_on(self.writer.send(&mut self.port, command)).map_err(link)?;
        if matches!(command, Command::Start | Command::Safe | Command::Full) {
            std::thread::sleep(Duration::from_millis(MODE_CHANGE_DELAY_MS as u64));
        }
        Ok(())
    }

    /// Send a command, returning the library error untouched.
    pub fn try_send(&mut self, command: &Command) -> Result<(), LinkError> {
        block_on(self.writer.send(&mut self.port, command))
    }

    pub fn query(&mut self, packet_id: u8) -> Result<SensorRecord> {
        block_on(serial::query_sensors(&mut self.port, packet_id)).map_err(link)
    }

    pub fn query_list(&mut self, ids: &[u8]) -> Result<Vec<SensorRecord>> {
        let records = block_on(serial::query_list(&mut self.port, ids)).map_err(link)?;
        Ok(records.into_iter().collect())
    }

    /// Current OI mode from packet 35.
    pub fn oi_mode(&mut self) -> Result<OiMode> {
        let record = self.query(35)?;
        record
            .oi_mode()
            .ok_or_else(|| anyhow::anyhow!("Packet 35 held an unknown mode: {:?}", record.get(35)))
    }

    /// Next valid stream frame; a timeout is reported as `SerialError::Timeout`.
    pub fn read_stream_frame(&mut self) -> Result<StreamFrame, SerialError> {
        block_on(self.stream.read_frame(&mut self.port))
    }

    /// Checksum failures and desyncs seen by the stream reader.
    pub fn stream_errors(&self) -> (u32, u32) {
        (self.stream.checksum_failures(), self.stream.desyncs())
    }
}
