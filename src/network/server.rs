use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};

use super::protocol::{TimestampRequest, TimestampResponse};
use crate::core::{Result, SiError, Timestamp};
use crate::timestamp::{TimestampBlockManager, TimestampOracle};

/// Standalone timestamp authority.
///
/// Every connection may send any number of 2-byte requests; each one is
/// answered with the echoed caller id and a fresh timestamp.
pub struct TimestampServer {
    oracle: OnceCell<Arc<TimestampOracle>>,
    block_manager: Arc<dyn TimestampBlockManager>,
    block_size: u64,
}

impl TimestampServer {
    #[must_use]
    pub fn new(block_manager: Arc<dyn TimestampBlockManager>, block_size: u64) -> Self {
        Self {
            oracle: OnceCell::new(),
            block_manager,
            block_size,
        }
    }

    /// Opens the oracle on first call; concurrent callers all observe the same instance.
    pub fn initialize_if_needed(&self) -> Result<Arc<TimestampOracle>> {
        self.oracle
            .get_or_try_init(|| {
                TimestampOracle::open(Arc::clone(&self.block_manager), self.block_size).map(Arc::new)
            })
            .cloned()
    }

    pub async fn start(self: Arc<Self>, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Accept loop. Returns only when the listener itself fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let oracle = self.initialize_if_needed()?;
        tracing::info!("Timestamp server listening on {}", listener.local_addr()?);

        loop {
            let (socket, addr) = listener.accept().await?;
            tracing::debug!("New timestamp connection from {}", addr);

            let oracle = Arc::clone(&oracle);
            tokio::spawn(async move {
                if let Err(e) = Self::handle_client(socket, addr, oracle).await {
                    tracing::warn!("Timestamp connection {} closed: {}", addr, e);
                }
            });
        }
    }

    async fn handle_client(
        socket: TcpStream,
        addr: SocketAddr,
        oracle: Arc<TimestampOracle>,
    ) -> Result<()> {
        socket.set_nodelay(true)?;
        let (reader, mut writer) = socket.into_split();
        let mut reader = BufReader::new(reader);

        while let Some(request) = TimestampRequest::read(&mut reader).await? {
            tracing::trace!("Timestamp request from {} caller id {}", addr, request.caller_id);

            let timestamp = match Self::allocate(&oracle).await {
                Ok(ts) => ts,
                Err(e) => {
                    // Closing the connection fails every request the client still has in flight
                    tracing::error!("Unable to allocate timestamp for {}: {}", addr, e);
                    return Err(e);
                }
            };

            let response = TimestampResponse {
                caller_id: request.caller_id,
                timestamp,
            };
            // The timestamp is consumed even when the response never arrives
            response.write(&mut writer).await.map_err(|e| {
                SiError::Delivery(format!(
                    "failed to respond to caller id {} with timestamp {}: {}",
                    request.caller_id, timestamp, e
                ))
            })?;
        }

        tracing::debug!("Timestamp connection {} finished", addr);
        Ok(())
    }

    /// Block rollovers fsync, so they run on the blocking pool instead of a worker.
    async fn allocate(oracle: &Arc<TimestampOracle>) -> Result<Timestamp> {
        if let Some(ts) = oracle.next_in_block() {
            return Ok(ts);
        }
        let oracle = Arc::clone(oracle);
        tokio::task::spawn_blocking(move || oracle.next())
            .await
            .map_err(|e| SiError::Allocation(format!("allocation task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::MemoryBlockManager;

    #[tokio::test]
    async fn test_allocate_crosses_block_boundaries() {
        let manager = Arc::new(MemoryBlockManager::new());
        let oracle = Arc::new(TimestampOracle::open(manager.clone(), 3).unwrap());

        let mut issued = Vec::new();
        for _ in 0..10 {
            issued.push(TimestampServer::allocate(&oracle).await.unwrap());
        }
        assert_eq!(issued, (1..=10).collect::<Vec<_>>());
        assert_eq!(manager.ceiling(), 12);
    }

    #[test]
    fn test_initialize_once_under_contention() {
        let manager = Arc::new(MemoryBlockManager::new());
        let server = Arc::new(TimestampServer::new(manager.clone(), 1000));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let server = Arc::clone(&server);
                std::thread::spawn(move || server.initialize_if_needed().unwrap())
            })
            .collect();
        let oracles: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(oracles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        // a single first-block reservation happened
        assert_eq!(manager.ceiling(), 1000);
    }
}
