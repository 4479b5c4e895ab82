use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::{debug, info};
use tokio::sync::RwLock;
use tonic::transport::{Channel, Endpoint};

use super::proto::raft_transport_client::RaftTransportClient;
use super::{PeerRegistry, TransportError};

/// Outbound channel cache: at most one channel per peer.
pub struct PeerClients {
    peers: PeerRegistry,
    connect_timeout: Duration,
    clients: RwLock<Cache>,
    opened: AtomicUsize,
}

#[derive(Default)]
struct Cache {
    channels: HashMap<u64, RaftTransportClient<Channel>>,
    closed: bool,
}

impl PeerClients {
    pub fn new(peers: PeerRegistry, connect_timeout: Duration) -> Self {
        Self {
            peers,
            connect_timeout,
            clients: RwLock::new(Cache::default()),
            opened: AtomicUsize::new(0),
        }
    }

    /// Return the cached client for `peer`, creating it on first use.
    ///
    /// The read lock serves the common case. Creation re-checks under the
    /// write lock so racing first sends share one channel, and fails once
    /// [`PeerClients::close_all`] has run.
    pub async fn get_or_connect(
        &self,
        peer: u64,
    ) -> Result<RaftTransportClient<Channel>, TransportError> {
        {
            let cache = self.clients.read().await;
            if let Some(client) = cache.channels.get(&peer) {
                return Ok(client.clone());
            }
        }

        let mut cache = self.clients.write().await;
        if cache.closed {
            return Err(TransportError::Shutdown);
        }
        if let Some(client) = cache.channels.get(&peer) {
            return Ok(client.clone());
        }

        let addr = self
            .peers
            .address(peer)
            .ok_or(TransportError::UnknownPeer(peer))?;
        let endpoint = Endpoint::from_shared(endpoint_uri(addr))
            .map_err(|e| TransportError::InvalidAddress {
                peer,
                reason: e.to_string(),
            })?
            .connect_timeout(self.connect_timeout);

        // Lazy: the TCP connection is made by the first request.
        let client = RaftTransportClient::new(endpoint.connect_lazy());
        cache.channels.insert(peer, client.clone());
        self.opened.fetch_add(1, Ordering::Relaxed);
        debug!("Opened channel to peer {} at {}", peer, addr);

        Ok(client)
    }

    pub async fn cached(&self) -> usize {
        self.clients.read().await.channels.len()
    }

    /// Total channels ever created.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    /// Drop every cached channel and refuse new ones. Returns how many were
    /// closed.
    pub async fn close_all(&self) -> usize {
        let mut cache = self.clients.write().await;
        cache.closed = true;
        let closed = cache.channels.len();
        for (peer, _) in cache.channels.drain() {
            info!("Closed connection to peer {}", peer);
        }
        closed
    }
}

fn endpoint_uri(addr: &str) -> String {
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    }
}
