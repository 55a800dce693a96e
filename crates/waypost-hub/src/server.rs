//! Socket acceptors feeding the hub

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UnixListener};
use tracing::{debug, error, info};

use crate::{Hub, HubError, HubResult};

/// Pause after a failed accept, so a persistent error (e.g. out of file
/// descriptors) does not spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts viewers on a Unix domain socket and, optionally, a TCP address
pub struct HubServer {
    hub: Hub,
    socket_path: PathBuf,
    tcp_addr: Option<SocketAddr>,
    unix: Option<UnixListener>,
    tcp: Option<TcpListener>,
}

impl HubServer {
    pub fn new(hub: Hub, socket_path: impl AsRef<Path>) -> Self {
        Self {
            hub,
            socket_path: socket_path.as_ref().to_path_buf(),
            tcp_addr: None,
            unix: None,
            tcp: None,
        }
    }

    /// Also listen on a TCP address
    pub fn with_tcp(mut self, addr: Option<SocketAddr>) -> Self {
        self.tcp_addr = addr;
        self
    }

    /// Bind the listeners
    pub async fn start(&mut self) -> HubResult<()> {
        // Remove a stale socket left by a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Readable/writable by owner and group
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))?;

        info!(path = %self.socket_path.display(), "Hub listening on socket");
        self.unix = Some(listener);

        if let Some(addr) = self.tcp_addr {
            let listener = TcpListener::bind(addr).await?;
            info!(addr = %listener.local_addr()?, "Hub listening on TCP");
            self.tcp = Some(listener);
        }

        Ok(())
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bound TCP address, once started
    pub fn tcp_local_addr(&self) -> Option<SocketAddr> {
        self.tcp.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Accept connections in a loop
    pub async fn run(&self) -> HubResult<()> {
        let unix = self
            .unix
            .as_ref()
            .ok_or_else(|| HubError::InvalidMessage("Server not started".into()))?;

        loop {
            tokio::select! {
                accepted = unix.accept() => match accepted {
                    Ok((stream, _)) => self.spawn_viewer(stream, "unix".to_string()),
                    Err(e) => back_off_after_accept_error("unix", &e).await,
                },
                accepted = accept_tcp(self.tcp.as_ref()) => match accepted {
                    Ok((stream, peer)) => {
                        let _ = stream.set_nodelay(true);
                        self.spawn_viewer(stream, peer.to_string());
                    }
                    Err(e) => back_off_after_accept_error("tcp", &e).await,
                },
            }
        }
    }

    fn spawn_viewer<S>(&self, stream: S, peer: String)
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
    {
        debug!(peer = %peer, "Connection accepted");
        let hub = self.hub.clone();
        tokio::spawn(async move {
            if let Err(e) = hub.serve_connection(stream).await {
                debug!(peer = %peer, error = %e, "Viewer connection ended with error");
            }
        });
    }

    /// Remove the socket file
    pub fn shutdown(&self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

impl Drop for HubServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn back_off_after_accept_error(listener: &'static str, e: &std::io::Error) {
    error!(listener, error = %e, "Failed to accept connection");
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

async fn accept_tcp(listener: Option<&TcpListener>) -> std::io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use waypost_config::HubSettings;

    #[tokio::test]
    async fn test_server_start() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("nested").join("test.sock");

        let mut server = HubServer::new(Hub::spawn(HubSettings::default()), &socket_path);
        server.start().await.unwrap();
        assert!(socket_path.exists());

        let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o660);

        drop(server);
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_stale_socket_is_replaced() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        std::fs::write(&socket_path, b"stale").unwrap();

        let mut server = HubServer::new(Hub::spawn(HubSettings::default()), &socket_path);
        server.start().await.unwrap();
        assert!(server.tcp_local_addr().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_error_backs_off() {
        let started = tokio::time::Instant::now();
        let emfile = std::io::Error::from_raw_os_error(24);
        back_off_after_accept_error("unix", &emfile).await;
        assert!(started.elapsed() >= ACCEPT_BACKOFF);
    }

    #[tokio::test]
    async fn test_run_before_start_fails() {
        let server = HubServer::new(Hub::spawn(HubSettings::default()), "/nonexistent/hub.sock");
        assert!(server.run().await.is_err());
    }
}
