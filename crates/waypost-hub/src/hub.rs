//! Hub control loop and per-connection tasks

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};
use waypost_api::{
    ClientInfo, ClientMessage, ClientRole, DriverStatusUpdate, LiveMessage, LocationUpdate,
};
use waypost_config::HubSettings;

use crate::{Connection, ConnectionKey, EnqueueError, HubError, HubResult};

/// Requests handled by the control loop
enum Command {
    Register(Arc<Connection>),
    Unregister(Arc<Connection>),
    Broadcast {
        line: Arc<str>,
        role: Option<ClientRole>,
    },
    Count(oneshot::Sender<usize>),
    Shutdown,
}

/// Handle to the live distribution hub.
///
/// Cheap to clone. Every registry change and every broadcast is a message to
/// one control loop task, which owns the registry outright. Producers never
/// wait on viewers: a viewer whose queue is full is dropped.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<Command>,
    settings: HubSettings,
    next_key: Arc<AtomicU64>,
}

impl Hub {
    /// Start the control loop on the current runtime.
    pub fn spawn(settings: HubSettings) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(control_loop(rx));

        info!(
            queue_capacity = settings.queue_capacity,
            ping_secs = settings.ping_interval.as_secs(),
            "Live hub started"
        );

        Self {
            commands,
            settings,
            next_key: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    /// Create an unregistered connection with the configured queue size
    pub fn open(&self, info: ClientInfo) -> (Arc<Connection>, mpsc::Receiver<Arc<str>>) {
        let key = ConnectionKey::new(self.next_key.fetch_add(1, Ordering::Relaxed));
        Connection::new(key, info, self.settings.queue_capacity)
    }

    pub fn register(&self, conn: Arc<Connection>) -> HubResult<()> {
        self.commands
            .send(Command::Register(conn))
            .map_err(|_| HubError::HubStopped)
    }

    /// Remove a connection and close it. Safe to call any number of times.
    pub fn unregister(&self, conn: &Arc<Connection>) {
        if self.commands.send(Command::Unregister(Arc::clone(conn))).is_err() {
            conn.close();
        }
    }

    /// Send a location update to every viewer
    pub fn broadcast_location(&self, update: &LocationUpdate) -> HubResult<()> {
        self.broadcast(&LiveMessage::LocationUpdate(update.clone()), None)
    }

    /// Send a driver status change to admin viewers
    pub fn broadcast_driver_status(&self, update: &DriverStatusUpdate) -> HubResult<()> {
        self.broadcast_to_role(ClientRole::Admin, &LiveMessage::DriverStatus(update.clone()))
    }

    /// Send a message to viewers of one role
    pub fn broadcast_to_role(&self, role: ClientRole, message: &LiveMessage) -> HubResult<()> {
        self.broadcast(message, Some(role))
    }

    fn broadcast(&self, message: &LiveMessage, role: Option<ClientRole>) -> HubResult<()> {
        let line = encode_line(message)?;
        self.commands
            .send(Command::Broadcast { line, role })
            .map_err(|_| HubError::HubStopped)
    }

    /// Number of registered connections
    pub async fn connection_count(&self) -> HubResult<usize> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Count(tx))
            .map_err(|_| HubError::HubStopped)?;
        rx.await.map_err(|_| HubError::HubStopped)
    }

    /// Close every connection and stop the control loop
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    /// Serve one viewer over a byte stream until it goes away.
    ///
    /// Expects a hello line first, then registers the viewer and runs its
    /// writer task alongside the reader until either side ends.
    pub async fn serve_connection<S>(&self, stream: S) -> HubResult<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        let info = self.handshake(&mut reader).await?;
        let (conn, outbound) = self.open(info);
        self.register(Arc::clone(&conn))?;
        conn.mark_open();

        info!(
            client_id = %conn.client_id(),
            connection = %conn.key(),
            role = ?conn.role(),
            "Viewer connected"
        );

        let writer = tokio::spawn(write_loop(
            Arc::clone(&conn),
            outbound,
            write_half,
            self.settings.ping_interval,
            self.settings.write_timeout,
        ));

        read_loop(&conn, &mut reader, self.settings.read_timeout).await;

        self.unregister(&conn);
        conn.close();
        if let Err(e) = writer.await {
            warn!(client_id = %conn.client_id(), error = %e, "Viewer writer task failed");
        }

        info!(client_id = %conn.client_id(), connection = %conn.key(), "Viewer disconnected");
        Ok(())
    }

    async fn handshake<R>(&self, reader: &mut R) -> HubResult<ClientInfo>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = String::new();
        let n = timeout(self.settings.read_timeout, reader.read_line(&mut line))
            .await
            .map_err(|_| HubError::Handshake("timed out waiting for hello".into()))??;
        if n == 0 {
            return Err(HubError::ConnectionClosed);
        }

        let message: ClientMessage = serde_json::from_str(line.trim())
            .map_err(|e| HubError::Handshake(format!("bad hello: {e}")))?;

        message
            .into_client_info()
            .ok_or_else(|| HubError::Handshake("first message must be a hello".into()))
    }
}

/// Serialize a message as one NDJSON line
pub fn encode_line(message: &LiveMessage) -> HubResult<Arc<str>> {
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    Ok(Arc::from(json))
}

async fn control_loop(mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut registry: HashMap<ConnectionKey, Arc<Connection>> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Register(conn) => {
                if conn.is_closed() {
                    debug!(client_id = %conn.client_id(), "Not registering closed connection");
                    continue;
                }
                registry.insert(conn.key(), conn);
            }

            Command::Unregister(conn) => {
                registry.remove(&conn.key());
                if conn.close() {
                    debug!(client_id = %conn.client_id(), connection = %conn.key(), "Connection unregistered");
                }
            }

            Command::Broadcast { line, role } => {
                let mut dropped = Vec::new();
                for conn in registry.values() {
                    if role.is_some_and(|role| conn.role() != role) {
                        continue;
                    }
                    if let Err(e) = conn.try_enqueue(Arc::clone(&line)) {
                        dropped.push((conn.key(), e));
                    }
                }

                for (key, reason) in dropped {
                    if let Some(conn) = registry.remove(&key) {
                        conn.close();
                        match reason {
                            EnqueueError::Full => warn!(
                                client_id = %conn.client_id(),
                                connection = %key,
                                "Viewer queue full, dropping slow viewer"
                            ),
                            EnqueueError::Closed => debug!(
                                client_id = %conn.client_id(),
                                connection = %key,
                                "Removing closed viewer"
                            ),
                        }
                    }
                }
            }

            Command::Count(reply) => {
                let _ = reply.send(registry.len());
            }

            Command::Shutdown => break,
        }
    }

    for conn in registry.into_values() {
        conn.close();
    }
    debug!("Live hub stopped");
}

async fn write_loop<W>(
    conn: Arc<Connection>,
    mut outbound: mpsc::Receiver<Arc<str>>,
    mut writer: W,
    ping_interval: Duration,
    write_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    let ping = match encode_line(&LiveMessage::Ping) {
        Ok(line) => line,
        Err(e) => {
            warn!(error = %e, "Failed to encode ping");
            conn.close();
            return;
        }
    };
    let mut heartbeat = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);

    loop {
        let line = tokio::select! {
            next = outbound.recv() => match next {
                Some(line) => line,
                None => break,
            },
            _ = heartbeat.tick() => Arc::clone(&ping),
        };

        let write = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        };
        match timeout(write_timeout, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(client_id = %conn.client_id(), error = %e, "Write error");
                break;
            }
            Err(_) => {
                debug!(client_id = %conn.client_id(), "Write timed out");
                break;
            }
        }
    }

    let _ = writer.shutdown().await;
    conn.close();
}

async fn read_loop<R>(conn: &Connection, reader: &mut R, read_timeout: Duration)
where
    R: AsyncBufRead + Unpin,
{
    let mut closed = conn.closed_signal();
    if *closed.borrow() {
        return;
    }

    let mut line = String::new();
    loop {
        line.clear();
        let read = tokio::select! {
            _ = closed.changed() => break,
            read = timeout(read_timeout, reader.read_line(&mut line)) => read,
        };

        match read {
            Err(_) => {
                debug!(client_id = %conn.client_id(), "Read deadline missed, closing");
                break;
            }
            Ok(Ok(0)) => {
                debug!(client_id = %conn.client_id(), "Viewer disconnected (EOF)");
                break;
            }
            Ok(Ok(_)) => {
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                match serde_json::from_str::<ClientMessage>(text) {
                    Ok(ClientMessage::Pong) => {}
                    Ok(ClientMessage::Hello { .. }) => {
                        debug!(client_id = %conn.client_id(), "Ignoring repeated hello");
                    }
                    Err(e) => {
                        debug!(client_id = %conn.client_id(), error = %e, "Ignoring invalid line");
                    }
                }
            }
            Ok(Err(e)) => {
                debug!(client_id = %conn.client_id(), error = %e, "Read error");
                break;
            }
        }
    }

    conn.close();
}
