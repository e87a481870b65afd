use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use super::protocol::{CallerId, TimestampRequest, TimestampResponse};
use crate::core::{Result, SiError, Timestamp};

type Pending = Arc<SyncMutex<PendingRequests>>;

#[derive(Default)]
struct PendingRequests {
    waiters: HashMap<CallerId, oneshot::Sender<Timestamp>>,
    /// Set once the reader task stops; new requests fail fast
    closed: bool,
}

/// Client side of the timestamp wire protocol.
///
/// Many tasks may call [`TimestampClient::next_timestamp`] concurrently; requests
/// share one connection and responses are matched back by caller id.
pub struct TimestampClient {
    writer: Mutex<OwnedWriteHalf>,
    pending: Pending,
    next_caller_id: AtomicU16,
    timeout: Duration,
    reader_task: JoinHandle<()>,
}

impl TimestampClient {
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let socket = TcpStream::connect(addr).await?;
        socket.set_nodelay(true)?;
        let (reader, writer) = socket.into_split();

        let pending: Pending = Arc::new(SyncMutex::new(PendingRequests::default()));
        let reader_task = tokio::spawn(Self::read_responses(reader, Arc::clone(&pending)));

        Ok(Self {
            writer: Mutex::new(writer),
            pending,
            next_caller_id: AtomicU16::new(0),
            timeout,
            reader_task,
        })
    }

    /// Requests one timestamp.
    ///
    /// A `Delivery` error does not mean the timestamp was left unconsumed on the
    /// server; it only means this caller never learned its value.
    pub async fn next_timestamp(&self) -> Result<Timestamp> {
        let (caller_id, receiver) = self.register()?;

        let sent = {
            let mut writer = self.writer.lock().await;
            TimestampRequest { caller_id }.write(&mut *writer).await
        };
        if let Err(e) = sent {
            self.pending.lock().waiters.remove(&caller_id);
            return Err(SiError::Delivery(format!("write for caller id {caller_id} failed: {e}")));
        }

        match tokio::time::timeout(self.timeout, receiver).await {
            Ok(Ok(ts)) => Ok(ts),
            Ok(Err(_)) => Err(SiError::Delivery(format!(
                "connection lost before caller id {caller_id} got its timestamp"
            ))),
            Err(_) => {
                self.pending.lock().waiters.remove(&caller_id);
                Err(SiError::Delivery(format!(
                    "no response for caller id {caller_id} within {:?}",
                    self.timeout
                )))
            }
        }
    }

    /// Number of requests still waiting for a response.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.lock().waiters.len()
    }

    fn register(&self) -> Result<(CallerId, oneshot::Receiver<Timestamp>)> {
        let mut pending = self.pending.lock();
        if pending.closed {
            return Err(SiError::Delivery("connection to timestamp server is closed".into()));
        }
        if pending.waiters.len() > usize::from(CallerId::MAX) {
            return Err(SiError::Delivery("too many timestamp requests in flight".into()));
        }

        // Skip ids that still belong to an unanswered request
        let caller_id = loop {
            let id = self.next_caller_id.fetch_add(1, Ordering::Relaxed);
            if !pending.waiters.contains_key(&id) {
                break id;
            }
        };

        let (sender, receiver) = oneshot::channel();
        pending.waiters.insert(caller_id, sender);
        Ok((caller_id, receiver))
    }

    async fn read_responses(reader: OwnedReadHalf, pending: Pending) {
        let mut reader = BufReader::new(reader);
        loop {
            match TimestampResponse::read(&mut reader).await {
                Ok(response) => {
                    let waiter = pending.lock().waiters.remove(&response.caller_id);
                    match waiter {
                        // The receiver may already have timed out; nothing to do then
                        Some(sender) => {
                            let _ = sender.send(response.timestamp);
                        }
                        None => tracing::warn!(
                            "Timestamp {} for unknown caller id {}",
                            response.timestamp,
                            response.caller_id
                        ),
                    }
                }
                Err(e) => {
                    tracing::debug!("Timestamp connection closed: {}", e);
                    break;
                }
            }
        }

        // Dropping the senders fails every outstanding request with Delivery
        let mut pending = pending.lock();
        pending.closed = true;
        pending.waiters.clear();
    }
}

impl Drop for TimestampClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}
