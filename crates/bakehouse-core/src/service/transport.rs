// Message transport between adjacent nodes
// The channel transport carries encoded frames to the inbox of the header's next hop

use std::collections::HashMap;

use bakehouse_common::{Direction, NodeId};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{trace, warn};

use crate::model::ExclusionMessage;

/// Send primitive used by the protocol component
pub trait Transport: Send + Sync {
    /// Emit `message` towards `message.header.next_hop`.
    ///
    /// Delivery is at most once and unacknowledged.
    fn send(&self, direction: Direction, message: ExclusionMessage);
}

/// Item queued in a node's inbox
#[derive(Debug)]
pub enum Inbound {
    /// Encoded message together with the side it arrived from
    Frame { direction: Direction, frame: Vec<u8> },
    /// Stop one worker of the receiving node
    Stop,
}

/// Transport delivering frames over in-process channels
pub struct ChannelTransport {
    inboxes: HashMap<NodeId, UnboundedSender<Inbound>>,
}

impl ChannelTransport {
    pub fn new(inboxes: HashMap<NodeId, UnboundedSender<Inbound>>) -> Self {
        Self { inboxes }
    }

    /// Side a message sent in `direction` arrives from at the receiver
    pub fn arrival_direction(direction: Direction) -> Direction {
        match direction {
            Direction::Up => Direction::Up,
            Direction::Peer => Direction::Peer,
            Direction::Down | Direction::None => Direction::Down,
        }
    }
}

impl Transport for ChannelTransport {
    fn send(&self, direction: Direction, message: ExclusionMessage) {
        if direction == Direction::None {
            trace!(kind = %message.kind(), "Message without direction not emitted");
            return;
        }

        let target = message.header.next_hop;
        let Some(inbox) = self.inboxes.get(&target) else {
            warn!(target, kind = %message.kind(), "No inbox for next hop, dropping message");
            return;
        };

        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to encode message, dropping");
                return;
            }
        };

        let inbound = Inbound::Frame {
            direction: Self::arrival_direction(direction),
            frame,
        };
        if inbox.send(inbound).is_err() {
            warn!(target, "Inbox closed, dropping message");
        }
    }
}
