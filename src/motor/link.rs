// Serial transport for the Roboteq ASCII protocol
//
// Lines are CR-terminated in both directions. The `Link` trait separates the
// protocol logic from the OS serial handle so it can run against `MockLink`.

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Line terminator for commands and responses
pub const TERMINATOR: u8 = b'\r';

/// Error types for the serial link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port {port} unavailable: {source}")]
    PortUnavailable {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Timeout waiting for response on {port}")]
    ReadTimeout { port: String },

    #[error("Serial port {port} is closed")]
    Closed { port: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// A point-to-point line-oriented connection to one controller
pub trait Link {
    /// Identifier of the physical port
    fn port(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Acquire the underlying handle (no-op if already open)
    fn open(&mut self) -> Result<()>;

    /// Write `command` followed by the terminator
    fn send(&mut self, command: &str) -> Result<()>;

    /// Read one line, terminator included
    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>>;

    /// Release the handle; closing a closed link does nothing
    fn close(&mut self);
}

/// Production link backed by the `serialport` crate
pub struct SerialLink {
    port_name: String,
    baudrate: u32,
    timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
    // bytes read past the last terminator
    pending: Vec<u8>,
}

impl SerialLink {
    /// Open `port_name` with the given baudrate and read timeout
    pub fn open(port_name: &str, baudrate: u32, timeout: Duration) -> Result<Self> {
        let mut link = Self {
            port_name: port_name.to_string(),
            baudrate,
            timeout,
            port: None,
            pending: Vec::new(),
        };
        Link::open(&mut link)?;
        Ok(link)
    }

    fn handle(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        match self.port.as_mut() {
            Some(port) => Ok(port),
            None => Err(LinkError::Closed {
                port: self.port_name.clone(),
            }),
        }
    }

    /// Split the first complete line off the pending buffer
    fn take_line(&mut self) -> Option<Vec<u8>> {
        let end = self.pending.iter().position(|&b| b == TERMINATOR)?;
        let rest = self.pending.split_off(end + 1);
        Some(std::mem::replace(&mut self.pending, rest))
    }
}

impl Link for SerialLink {
    fn port(&self) -> &str {
        &self.port_name
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        info!("Opening serial port {} at {} baud", self.port_name, self.baudrate);
        let port = serialport::new(&self.port_name, self.baudrate)
            .timeout(self.timeout)
            .open()
            .map_err(|source| LinkError::PortUnavailable {
                port: self.port_name.clone(),
                source,
            })?;
        self.port = Some(port);
        self.pending.clear();
        Ok(())
    }

    fn send(&mut self, command: &str) -> Result<()> {
        debug!("{} <- {:?}", self.port_name, command);
        let mut frame = Vec::with_capacity(command.len() + 1);
        frame.extend_from_slice(command.as_bytes());
        frame.push(TERMINATOR);

        // Drop late replies to an earlier command so the next receive
        // only sees the reply to this one
        self.pending.clear();
        let port = self.handle()?;
        port.clear(serialport::ClearBuffer::Input)
            .map_err(std::io::Error::from)?;
        port.write_all(&frame)?;
        port.flush()?;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 64];

        loop {
            if let Some(line) = self.take_line() {
                debug!("{} -> {:?}", self.port_name, String::from_utf8_lossy(&line));
                return Ok(line);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LinkError::ReadTimeout {
                    port: self.port_name.clone(),
                });
            }

            let port = self.handle()?;
            port.set_timeout(remaining).map_err(std::io::Error::from)?;
            match port.read(&mut buf) {
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(LinkError::ReadTimeout {
                        port: self.port_name.clone(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(LinkError::Io(e)),
            }
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Closed serial port {}", self.port_name);
        }
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_port_is_unavailable() {
        let result = SerialLink::open(
            "/dev/roboteq-does-not-exist",
            115_200,
            Duration::from_millis(10),
        );
        match result {
            Err(LinkError::PortUnavailable { port, .. }) => {
                assert_eq!(port, "/dev/roboteq-does-not-exist")
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("opening a missing port should fail"),
        }
    }

    #[test]
    fn test_take_line_keeps_remainder() {
        let mut link = SerialLink {
            port_name: "test".to_string(),
            baudrate: 115_200,
            timeout: Duration::from_millis(10),
            port: None,
            pending: b"+\rFF=0\rBS".to_vec(),
        };
        assert_eq!(link.take_line().unwrap(), b"+\r");
        assert_eq!(link.take_line().unwrap(), b"FF=0\r");
        assert!(link.take_line().is_none());
        assert_eq!(link.pending, b"BS");
    }

    #[test]
    fn test_closed_link_rejects_io() {
        let mut link = SerialLink {
            port_name: "test".to_string(),
            baudrate: 115_200,
            timeout: Duration::from_millis(10),
            port: None,
            pending: Vec::new(),
        };
        assert!(!link.is_open());
        assert!(matches!(link.send("?FF"), Err(LinkError::Closed { .. })));
        assert!(matches!(
            link.receive(Duration::from_millis(10)),
            Err(LinkError::Closed { .. })
        ));
        // idempotent
        link.close();
        link.close();
    }

    #[cfg(unix)]
    #[test]
    fn test_late_reply_discarded_before_next_command() {
        use serialport::TTYPort;

        let (host, mut controller) = TTYPort::pair().unwrap();
        let timeout = Duration::from_millis(50);
        let mut link = SerialLink {
            port_name: "pty".to_string(),
            baudrate: 115_200,
            timeout,
            port: Some(Box::new(host)),
            pending: Vec::new(),
        };

        link.send("?FF").unwrap();
        assert!(matches!(
            link.receive(timeout),
            Err(LinkError::ReadTimeout { .. })
        ));

        // reply to ?FF shows up after the timeout, part of it already buffered
        controller.write_all(b"FF=0\r").unwrap();
        controller.flush().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        link.pending.extend_from_slice(b"+\rBS=");

        link.send("!G 1 0").unwrap();
        assert!(link.pending.is_empty());
        controller.write_all(b"+\r").unwrap();
        controller.flush().unwrap();

        assert_eq!(link.receive(Duration::from_millis(500)).unwrap(), b"+\r");
        assert!(matches!(
            link.receive(timeout),
            Err(LinkError::ReadTimeout { .. })
        ));
    }
}
