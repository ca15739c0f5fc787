//! Observer channel abstraction for pushing frames to observers.

use crate::error::EnvError;
use crate::types::{Frame, ObserverId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// The boundary between the broadcast sink and whatever transport carries
/// frames to an observer.
///
/// # Frame Flow
///
/// ```text
/// Clock                 Sink                    Transport            Observer
///   |-- snapshot ------->|                          |                    |
///   |                    |-- try_deliver(frame) --->|                    |
///   |                    |                          |-- socket write --->|
/// ```
///
/// `try_deliver` must never block: a transport that cannot accept the frame
/// right now returns an error and is dropped by the sink.
pub trait ObserverChannel: Send + Sync {
    /// Returns this observer's ID.
    fn id(&self) -> ObserverId;

    /// Hands a frame to the transport without waiting.
    ///
    /// # Returns
    /// * `Ok(())` - Frame queued for delivery
    /// * `Err(EnvError::QueueFull)` - Observer is too slow
    /// * `Err(EnvError::ChannelClosed)` - Observer is gone
    fn try_deliver(&self, frame: Frame) -> Result<(), EnvError>;
}

/// Bounded in-memory queue in front of an observer's writer task.
pub struct QueuedChannel {
    id: ObserverId,
    tx: mpsc::Sender<Frame>,
}

impl QueuedChannel {
    /// Creates a channel with room for `capacity` undelivered frames.
    ///
    /// The receiver is handed to the task that writes to the real socket.
    pub fn new(id: ObserverId, capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id, tx }, rx)
    }
}

impl ObserverChannel for QueuedChannel {
    fn id(&self) -> ObserverId {
        self.id
    }

    fn try_deliver(&self, frame: Frame) -> Result<(), EnvError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => EnvError::QueueFull(self.id),
            TrySendError::Closed(_) => EnvError::ChannelClosed(self.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queued_channel_delivers_in_order() {
        let (channel, mut rx) = QueuedChannel::new(ObserverId::from_seed(1), 4);

        channel.try_deliver(Frame::from("a")).unwrap();
        channel.try_deliver(Frame::from("b")).unwrap();

        assert_eq!(&*rx.try_recv().unwrap(), "a");
        assert_eq!(&*rx.try_recv().unwrap(), "b");
    }

    #[test]
    fn test_queued_channel_full() {
        let id = ObserverId::from_seed(2);
        let (channel, _rx) = QueuedChannel::new(id, 1);

        channel.try_deliver(Frame::from("a")).unwrap();
        assert_eq!(channel.try_deliver(Frame::from("b")), Err(EnvError::QueueFull(id)));
    }

    #[test]
    fn test_queued_channel_closed() {
        let id = ObserverId::from_seed(3);
        let (channel, rx) = QueuedChannel::new(id, 1);
        drop(rx);

        let err = channel.try_deliver(Frame::from("a")).unwrap_err();
        assert_eq!(err, EnvError::ChannelClosed(id));
        assert_eq!(err.observer(), Some(id));
    }
}
