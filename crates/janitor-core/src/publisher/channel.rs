use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::diff::Correction;
use crate::message::ChangeRequest;
use crate::traits::{CorrectionPublisher, PublishedCorrection};
use crate::Error;

/// Forwards every correction to an `mpsc` channel
///
/// Waits for capacity, so a slow consumer slows the engine down instead of
/// losing results. A dropped receiver makes every publish fail (retryable).
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<PublishedCorrection>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiving end of its channel
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PublishedCorrection>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Wrap an existing sender
    pub fn from_sender(tx: mpsc::Sender<PublishedCorrection>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl CorrectionPublisher for ChannelPublisher {
    async fn publish(&self, request: &ChangeRequest, correction: &Correction) -> Result<(), Error> {
        self.tx
            .send(PublishedCorrection {
                request: request.clone(),
                correction: correction.clone(),
            })
            .await
            .map_err(|_| Error::publish("Correction receiver dropped"))
    }

    fn publisher_name(&self) -> &'static str {
        "channel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forwards_corrections() {
        let (publisher, mut rx) = ChannelPublisher::new(4);
        let request = ChangeRequest::all("prod");

        publisher.publish(&request, &Correction::default()).await.unwrap();

        let published = rx.recv().await.unwrap();
        assert_eq!(published.request, request);
        assert!(published.correction.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_retryable() {
        let (publisher, rx) = ChannelPublisher::new(1);
        drop(rx);

        let err = publisher
            .publish(&ChangeRequest::all("prod"), &Correction::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Publish(_)));
        assert!(err.is_retryable());
    }
}
