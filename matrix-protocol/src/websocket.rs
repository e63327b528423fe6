//! WebSocket transport.
//!
//! The display bridge speaks the same framed protocol inside binary
//! WebSocket messages. Message boundaries carry no meaning here: each binary
//! message is handed to the frame scanner as one more chunk of the stream.

use std::net::TcpStream;
use std::time::Duration;

use tungstenite::client::IntoClientRequest;
use tungstenite::protocol::Message as WsMessage;
use tungstenite::WebSocket;

use crate::transport::{idle_on_timeout, ReadOutcome, Transport, DEFAULT_POLL_INTERVAL};
use crate::ProtocolError;

/// A display reached through a WebSocket bridge
pub struct WebSocketTransport {
    websocket: WebSocket<TcpStream>,
    url: String,
}

impl WebSocketTransport {
    /// Connect with the default poll interval
    pub fn connect(url: &str) -> Result<Self, ProtocolError> {
        Self::connect_with_poll(url, DEFAULT_POLL_INTERVAL)
    }

    /// Connect to a `ws://` URL; `poll` bounds each read
    pub fn connect_with_poll(url: &str, poll: Duration) -> Result<Self, ProtocolError> {
        let request = url.into_client_request()?;
        let host = request.uri().host().unwrap_or("localhost").to_string();
        let port = request.uri().port_u16().unwrap_or(80);

        let stream = TcpStream::connect((host.as_str(), port))?;
        // Disable Nagle's algorithm for lower latency
        let _ = stream.set_nodelay(true);

        // Handshake in blocking mode, then bound reads by the poll interval
        let (websocket, _response) = tungstenite::client(request, stream).map_err(|e| {
            ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e.to_string(),
            ))
        })?;
        websocket.get_ref().set_read_timeout(Some(poll))?;

        log::info!("Connected to {}", url);
        Ok(WebSocketTransport {
            websocket,
            url: url.to_string(),
        })
    }

    /// Close the WebSocket connection gracefully
    pub fn close(&mut self) -> Result<(), ProtocolError> {
        self.websocket.close(None)?;
        // Flush pending close frame
        let _ = self.websocket.flush();
        Ok(())
    }

    /// Check if the connection is still open
    pub fn is_open(&self) -> bool {
        self.websocket.can_read() && self.websocket.can_write()
    }
}

impl Transport for WebSocketTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.websocket.send(WsMessage::Binary(bytes.to_vec().into()))?;
        Ok(())
    }

    fn read(&mut self) -> Result<ReadOutcome, ProtocolError> {
        match self.websocket.read() {
            Ok(WsMessage::Binary(data)) => Ok(ReadOutcome::Data(data.to_vec())),
            Ok(WsMessage::Close(_)) => Ok(ReadOutcome::Closed),
            // Pings are answered by tungstenite on the next read or write
            Ok(_) => Ok(ReadOutcome::Idle),
            Err(tungstenite::Error::Io(e)) => idle_on_timeout(e),
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                Ok(ReadOutcome::Closed)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if self.is_open() {
            let _ = self.close();
        }
    }
}
