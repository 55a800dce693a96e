//! Live viewer client

use std::net::SocketAddr;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};
use waypost_api::{ClientMessage, ClientRole, LiveMessage};
use waypost_util::ClientId;

use crate::{HubError, HubResult};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Viewer connection to waypostd's live hub.
///
/// Pings are answered transparently; [`LiveClient::next`] yields only
/// location and status messages.
pub struct LiveClient {
    reader: BufReader<BoxedReader>,
    writer: BoxedWriter,
}

impl LiveClient {
    /// Connect over the daemon's Unix socket
    pub async fn connect(
        socket_path: impl AsRef<Path>,
        client_id: Option<ClientId>,
        role: ClientRole,
    ) -> HubResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        Self::handshake(stream, client_id, role).await
    }

    /// Connect over TCP
    pub async fn connect_tcp(
        addr: SocketAddr,
        client_id: Option<ClientId>,
        role: ClientRole,
    ) -> HubResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::handshake(stream, client_id, role).await
    }

    /// Say hello over an already connected stream
    pub async fn handshake<S>(stream: S, client_id: Option<ClientId>, role: ClientRole) -> HubResult<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut client = Self {
            reader: BufReader::new(Box::new(read_half) as BoxedReader),
            writer: Box::new(write_half),
        };

        client.send(&ClientMessage::hello(client_id, role)).await?;
        Ok(client)
    }

    async fn send(&mut self, message: &ClientMessage) -> HubResult<()> {
        let mut json = serde_json::to_string(message)?;
        json.push('\n');
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Wait for the next location or status message
    pub async fn next(&mut self) -> HubResult<LiveMessage> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(HubError::ConnectionClosed);
            }

            let text = line.trim();
            if text.is_empty() {
                continue;
            }

            let message: LiveMessage = serde_json::from_str(text)
                .map_err(|e| HubError::InvalidMessage(format!("{e}: {text}")))?;
            match message {
                LiveMessage::Ping => {
                    // A pong that cannot be written shows up as EOF on the next read
                    if let Err(e) = self.send(&ClientMessage::Pong).await {
                        tracing::debug!(error = %e, "Failed to answer ping");
                    }
                }
                other => return Ok(other),
            }
        }
    }
}
