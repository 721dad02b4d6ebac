use crate::error::EndpointError;
use crate::packet::Packet;
use tokio::sync::mpsc;

/// FIFO of outgoing packets, decoupling producers (the request initiator,
/// handler-dispatch tasks) from the socket.
///
/// Bounded: a full queue makes `put` block, and that block is cancellable by
/// the caller's ambient timeout since it's just another `.await` point.
pub struct SendQueue {
    sender: mpsc::Sender<Packet>,
}

pub struct SendQueueReceiver {
    receiver: mpsc::Receiver<Packet>,
}

impl SendQueue {
    pub fn new(capacity: usize) -> (Self, SendQueueReceiver) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, SendQueueReceiver { receiver })
    }

    pub async fn put(&self, packet: Packet) -> Result<(), EndpointError> {
        self.sender
            .send(packet)
            .await
            .map_err(|_| EndpointError::QueueClosed)
    }
}

impl Clone for SendQueue {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl SendQueueReceiver {
    /// Blocks until a packet is available or the queue is closed (`None`),
    /// which the sender loop treats as its exit signal.
    pub async fn take(&mut self) -> Option<Packet> {
        self.receiver.recv().await
    }
}
