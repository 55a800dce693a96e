//! Per-viewer connection state

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use waypost_api::{ClientInfo, ClientRole};
use waypost_util::ClientId;

/// Lifecycle of a viewer connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Hub-assigned key, unique per connection even when client ids repeat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey(u64);

impl ConnectionKey {
    pub fn new(key: u64) -> Self {
        Self(key)
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why an enqueue was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The viewer is not keeping up
    Full,
    /// The connection is closing or closed
    Closed,
}

/// A registered viewer.
///
/// Holds the sending side of the viewer's bounded outbound queue. The writer
/// task owns the receiving side and is the only thing that touches the
/// underlying stream.
pub struct Connection {
    key: ConnectionKey,
    info: ClientInfo,
    state: AtomicU8,
    outbound: Mutex<Option<mpsc::Sender<Arc<str>>>>,
    closed: watch::Sender<bool>,
}

impl Connection {
    /// Create a connection with an outbound queue of `capacity` lines.
    pub fn new(
        key: ConnectionKey,
        info: ClientInfo,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);

        let conn = Arc::new(Self {
            key,
            info,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            outbound: Mutex::new(Some(tx)),
            closed,
        });
        (conn, rx)
    }

    pub fn key(&self) -> ConnectionKey {
        self.key
    }

    pub fn info(&self) -> &ClientInfo {
        &self.info
    }

    pub fn client_id(&self) -> &ClientId {
        &self.info.client_id
    }

    pub fn role(&self) -> ClientRole {
        self.info.role
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.state() >= ConnectionState::Closing
    }

    /// Move from `Connecting` to `Open`. Fails if the connection already
    /// started closing.
    pub fn mark_open(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Queue a serialized line without waiting.
    pub fn try_enqueue(&self, line: Arc<str>) -> Result<(), EnqueueError> {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = outbound.as_ref() else {
            return Err(EnqueueError::Closed);
        };

        tx.try_send(line).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Close the connection.
    ///
    /// Only the first call does anything: it drops the outbound queue (the
    /// writer drains what is left, then stops) and wakes the reader. Returns
    /// whether this call performed the close.
    pub fn close(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= ConnectionState::Closing as u8 {
                return false;
            }
            match self.state.compare_exchange(
                current,
                ConnectionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.closed.send_replace(true);
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
        true
    }

    /// Receiver that flips to `true` once the connection is closed
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("key", &self.key)
            .field("client_id", &self.info.client_id)
            .field("role", &self.info.role)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn conn(capacity: usize) -> (Arc<Connection>, mpsc::Receiver<Arc<str>>) {
        Connection::new(
            ConnectionKey::new(1),
            ClientInfo::viewer(ClientId::new("viewer-1")),
            capacity,
        )
    }

    #[test]
    fn lifecycle() {
        let (conn, _rx) = conn(4);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(conn.mark_open());
        assert_eq!(conn.state(), ConnectionState::Open);

        assert!(conn.close());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.mark_open());
        assert!(*conn.closed_signal().borrow());
    }

    #[test]
    fn full_queue_is_reported() {
        let (conn, mut rx) = conn(1);
        assert_eq!(conn.try_enqueue("a".into()), Ok(()));
        assert_eq!(conn.try_enqueue("b".into()), Err(EnqueueError::Full));

        assert_eq!(rx.try_recv().unwrap().as_ref(), "a");
        assert_eq!(conn.try_enqueue("c".into()), Ok(()));
    }

    #[test]
    fn close_drops_the_queue_after_draining() {
        let (conn, mut rx) = conn(4);
        conn.try_enqueue("last".into()).unwrap();
        conn.close();

        assert_eq!(conn.try_enqueue("late".into()), Err(EnqueueError::Closed));
        assert_eq!(rx.try_recv().unwrap().as_ref(), "last");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn concurrent_close_happens_exactly_once() {
        for _ in 0..50 {
            let (conn, _rx) = conn(4);
            conn.mark_open();

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let conn = Arc::clone(&conn);
                    thread::spawn(move || conn.close())
                })
                .collect();
            let closes = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|closed| *closed)
                .count();

            assert_eq!(closes, 1);
            assert_eq!(conn.state(), ConnectionState::Closed);
        }
    }
}
