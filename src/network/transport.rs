//! Transport facade: the outbound channel cache, the inbound queue and the
//! gRPC server behind one type.

use std::sync::Mutex;
use std::time::Duration;

use log::{info, warn};
use raft::prelude::Message;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Code, Request};

use super::client::PeerClients;
use super::proto::raft_transport_server::RaftTransportServer;
use super::proto::SendMessageRequest;
use super::server::TransportService;
use super::{encode_message, PeerRegistry, TransportError};

/// Anything the driver can hand outbound messages to.
#[tonic::async_trait]
pub trait MessageSender: Send + Sync + 'static {
    async fn send_message(&self, msg: Message) -> Result<(), TransportError>;
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub inbound_capacity: usize,
    pub send_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 100,
            send_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    Idle,
    Serving,
    Stopped,
}

pub struct Transport {
    node_id: u64,
    clients: PeerClients,
    send_timeout: Duration,
    inbound_tx: mpsc::Sender<Message>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Message>>>,
    shutdown_tx: watch::Sender<bool>,
    server_state: watch::Sender<ServerState>,
}

impl Transport {
    pub fn new(node_id: u64, peers: PeerRegistry, config: TransportConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let (shutdown_tx, _) = watch::channel(false);
        let (server_state, _) = watch::channel(ServerState::Idle);

        Self {
            node_id,
            clients: PeerClients::new(peers, config.connect_timeout),
            send_timeout: config.send_timeout,
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            shutdown_tx,
            server_state,
        }
    }

    /// The inbound queue. There is exactly one consumer, so this returns
    /// `Some` only on the first call.
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<Message>> {
        self.inbound_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Deliver one message to `msg.to`, bounded by the send timeout.
    /// No retry: the consensus protocol retransmits on its own.
    pub async fn send(&self, msg: Message) -> Result<(), TransportError> {
        if *self.shutdown_tx.borrow() {
            return Err(TransportError::Shutdown);
        }

        let peer = msg.to;
        let mut client = self.clients.get_or_connect(peer).await?;
        let request = Request::new(SendMessageRequest {
            message: encode_message(&msg),
        });

        let response = match time::timeout(self.send_timeout, client.send_message(request)).await {
            Ok(result) => result,
            Err(_) => {
                return Err(TransportError::Timeout {
                    peer,
                    after: self.send_timeout,
                })
            }
        };

        match response {
            Ok(response) => {
                let body = response.into_inner();
                if body.success {
                    Ok(())
                } else {
                    Err(TransportError::Rejected {
                        peer,
                        reason: body.error,
                    })
                }
            }
            Err(status) if status.code() == Code::ResourceExhausted => {
                Err(TransportError::ReceiveBufferFull(peer))
            }
            Err(status) => Err(status.into()),
        }
    }

    /// Serve inbound RPCs on `listener` until [`Transport::shutdown`].
    pub async fn serve(&self, listener: TcpListener) -> Result<(), TransportError> {
        if *self.shutdown_tx.borrow() {
            return Err(TransportError::Shutdown);
        }

        match listener.local_addr() {
            Ok(addr) => info!("Node {} transport listening on {}", self.node_id, addr),
            Err(e) => warn!("Node {} transport listener has no address: {}", self.node_id, e),
        }

        let service = TransportService::new(self.node_id, self.inbound_tx.clone());
        let mut stop = self.shutdown_tx.subscribe();
        self.server_state.send_replace(ServerState::Serving);

        let result = Server::builder()
            .add_service(RaftTransportServer::new(service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                let _ = stop.wait_for(|stop| *stop).await;
            })
            .await;

        self.server_state.send_replace(ServerState::Stopped);
        result.map_err(TransportError::from)
    }

    /// Stop accepting inbound traffic, let in-flight RPCs finish, then drop
    /// every cached outbound channel.
    pub async fn shutdown(&self) {
        info!("Node {} transport shutting down", self.node_id);
        self.shutdown_tx.send_replace(true);

        let mut state = self.server_state.subscribe();
        let _ = state.wait_for(|s| *s != ServerState::Serving).await;

        let closed = self.clients.close_all().await;
        info!(
            "Node {} transport stopped, closed {} outbound connections",
            self.node_id, closed
        );
    }

    pub async fn cached_connections(&self) -> usize {
        self.clients.cached().await
    }

    pub fn connections_opened(&self) -> usize {
        self.clients.opened()
    }
}

#[tonic::async_trait]
impl MessageSender for Transport {
    async fn send_message(&self, msg: Message) -> Result<(), TransportError> {
        self.send(msg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receiver_can_be_taken_once() {
        let transport = Transport::new(1, PeerRegistry::new(), TransportConfig::default());
        assert!(transport.take_receiver().is_some());
        assert!(transport.take_receiver().is_none());
    }

    #[tokio::test]
    async fn send_to_unknown_peer_fails_without_caching() {
        let transport = Transport::new(1, PeerRegistry::new(), TransportConfig::default());
        let msg = Message {
            to: 5,
            ..Default::default()
        };
        assert!(matches!(
            transport.send(msg).await,
            Err(TransportError::UnknownPeer(5))
        ));
        assert_eq!(transport.cached_connections().await, 0);
    }

    #[tokio::test]
    async fn shutdown_without_server_returns_and_blocks_sends() {
        let mut peers = PeerRegistry::new();
        peers.insert(2, "127.0.0.1:1");
        let transport = Transport::new(1, peers, TransportConfig::default());

        transport.shutdown().await;

        let msg = Message {
            to: 2,
            ..Default::default()
        };
        assert!(matches!(
            transport.send(msg).await,
            Err(TransportError::Shutdown)
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        assert!(matches!(
            transport.serve(listener).await,
            Err(TransportError::Shutdown)
        ));
    }
}
