//! Socket transport over Unix sockets and TCP connections.

use std::io::{Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::path::Path;
use std::time::Duration;

use crate::transport::{idle_on_timeout, ReadOutcome, Transport, DEFAULT_POLL_INTERVAL};
use crate::ProtocolError;

const READ_CHUNK: usize = 512;

/// Socket address type - either Unix socket path or TCP address
#[derive(Debug, Clone)]
pub enum SocketAddr {
    #[cfg(unix)]
    Unix(String),
    Tcp(String),
}

impl SocketAddr {
    /// Create a Unix socket address
    #[cfg(unix)]
    pub fn unix<P: AsRef<Path>>(path: P) -> Self {
        SocketAddr::Unix(path.as_ref().to_string_lossy().to_string())
    }

    /// Create a TCP socket address
    pub fn tcp<S: Into<String>>(addr: S) -> Self {
        SocketAddr::Tcp(addr.into())
    }
}

impl std::fmt::Display for SocketAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(unix)]
            SocketAddr::Unix(path) => write!(f, "unix:{}", path),
            SocketAddr::Tcp(addr) => write!(f, "tcp:{}", addr),
        }
    }
}

/// Internal enum for connection stream types
enum StreamInner {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl StreamInner {
    fn set_read_timeout(&self, dur: Option<Duration>) -> Result<(), std::io::Error> {
        match self {
            #[cfg(unix)]
            StreamInner::Unix(s) => s.set_read_timeout(dur),
            StreamInner::Tcp(s) => s.set_read_timeout(dur),
        }
    }
}

impl Read for StreamInner {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            #[cfg(unix)]
            StreamInner::Unix(s) => s.read(buf),
            StreamInner::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for StreamInner {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            #[cfg(unix)]
            StreamInner::Unix(s) => s.write(buf),
            StreamInner::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            #[cfg(unix)]
            StreamInner::Unix(s) => s.flush(),
            StreamInner::Tcp(s) => s.flush(),
        }
    }
}

/// A display reached through a stream socket
pub struct SocketTransport {
    stream: StreamInner,
    addr: SocketAddr,
    buf: [u8; READ_CHUNK],
}

impl SocketTransport {
    /// Connect with the default poll interval
    pub fn connect(addr: &SocketAddr) -> Result<Self, ProtocolError> {
        Self::connect_with_poll(addr, DEFAULT_POLL_INTERVAL)
    }

    /// Connect to a socket address; `poll` bounds each read
    pub fn connect_with_poll(addr: &SocketAddr, poll: Duration) -> Result<Self, ProtocolError> {
        let stream = match addr {
            #[cfg(unix)]
            SocketAddr::Unix(path) => StreamInner::Unix(UnixStream::connect(path)?),
            SocketAddr::Tcp(addr_str) => {
                let stream = TcpStream::connect(addr_str)?;
                // Disable Nagle's algorithm, frames are small and latency bound
                let _ = stream.set_nodelay(true);
                StreamInner::Tcp(stream)
            }
        };
        stream.set_read_timeout(Some(poll))?;
        log::info!("Connected to {}", addr);
        Ok(SocketTransport {
            stream,
            addr: addr.clone(),
            buf: [0; READ_CHUNK],
        })
    }
}

impl Transport for SocketTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read(&mut self) -> Result<ReadOutcome, ProtocolError> {
        match self.stream.read(&mut self.buf) {
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(n) => Ok(ReadOutcome::Data(self.buf[..n].to_vec())),
            Err(e) => idle_on_timeout(e),
        }
    }

    fn describe(&self) -> String {
        self.addr.to_string()
    }
}
