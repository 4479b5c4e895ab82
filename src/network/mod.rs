pub mod client;
pub mod error;
pub mod http_api;
pub mod metrics;
pub mod peers;
pub mod server;
pub mod transport;

pub mod proto {
    tonic::include_proto!("transport");
}

pub use error::TransportError;
pub use peers::PeerRegistry;
pub use server::TransportService;
pub use transport::{MessageSender, Transport, TransportConfig};

use raft::prelude::Message;
use raft_prost::Message as _;

/// Encode a raft message with the engine's own schema.
pub fn encode_message(msg: &Message) -> Vec<u8> {
    msg.encode_to_vec()
}

pub fn decode_message(bytes: &[u8]) -> Result<Message, TransportError> {
    Message::decode(bytes).map_err(|e| TransportError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use raft::prelude::{Entry, MessageType};
    use tonic::Status;

    #[test]
    fn raft_message_survives_the_wire_codec() {
        let mut msg = Message {
            from: 1,
            to: 2,
            term: 4,
            index: 9,
            entries: vec![Entry {
                index: 10,
                term: 4,
                data: b"payload".to_vec().into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        msg.set_msg_type(MessageType::MsgAppend);

        let decoded = decode_message(&encode_message(&msg)).expect("decode");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            decode_message(&[0x0a, 0xff]),
            Err(TransportError::Decode(_))
        ));
    }

    #[test]
    fn display_includes_error_kind() {
        let err = TransportError::ReceiveBufferFull(3);
        assert!(err.to_string().contains("Receive buffer full"));
        assert!(err.is_backpressure());

        let err: TransportError = Status::unavailable("down").into();
        assert!(err.to_string().contains("gRPC error"));
        assert!(!err.is_timeout());
    }
}
