use log::{debug, warn};
use raft::prelude::Message;
use tokio::sync::mpsc::{self, error::TrySendError};
use tonic::{Request, Response, Status};

use super::proto::raft_transport_server::RaftTransport;
use super::proto::{SendMessageRequest, SendMessageResponse};
use super::{decode_message, metrics};

/// Inbound side of the transport. Never blocks on a slow driver: a full
/// queue is reported back to the sending peer.
#[derive(Clone)]
pub struct TransportService {
    node_id: u64,
    inbound: mpsc::Sender<Message>,
}

impl TransportService {
    pub fn new(node_id: u64, inbound: mpsc::Sender<Message>) -> Self {
        Self { node_id, inbound }
    }
}

#[tonic::async_trait]
impl RaftTransport for TransportService {
    async fn send_message(
        &self,
        request: Request<SendMessageRequest>,
    ) -> Result<Response<SendMessageResponse>, Status> {
        let req = request.into_inner();
        let msg = decode_message(&req.message).map_err(|e| {
            warn!("Node {} received undecodable message: {}", self.node_id, e);
            Status::invalid_argument(e.to_string())
        })?;

        match self.inbound.try_send(msg) {
            Ok(()) => Ok(Response::new(SendMessageResponse {
                success: true,
                error: String::new(),
            })),
            Err(TrySendError::Full(msg)) => {
                metrics::record_inbound_dropped();
                debug!(
                    "Node {} dropping {:?} from {}: receive buffer full",
                    self.node_id,
                    msg.msg_type(),
                    msg.from
                );
                Err(Status::resource_exhausted("receive buffer full"))
            }
            Err(TrySendError::Closed(_)) => Err(Status::unavailable("node is shutting down")),
        }
    }
}
