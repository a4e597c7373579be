use tokio::sync::mpsc;

use crate::codec::WireEnvelope;
use crate::error::ChannelError;

/// Sending side of the shared, unbounded FIFO between publishers and the router.
#[derive(Debug, Clone)]
pub struct OutgoingQueue {
    sender: mpsc::UnboundedSender<WireEnvelope>,
}

impl OutgoingQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WireEnvelope>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Never blocks; fails only when the receiving side has been dropped.
    pub fn push(&self, envelope: WireEnvelope) -> Result<(), ChannelError> {
        self.sender
            .send(envelope)
            .map_err(|_| ChannelError::QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
