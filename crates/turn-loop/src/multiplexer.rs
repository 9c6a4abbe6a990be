//! Response multiplexer - Per-channel correlation of inference results
//!
//! One capacity-1 mailbox per channel id. A deferred layer registers a
//! waiter before dispatching its request; the inference collaborator's
//! inbound handler publishes result batches to the same channel. At most one
//! waiter per channel may exist at a time, and a publish with no registered
//! waiter is a protocol error, never a silent drop.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;

use convo_core::ResultBatch;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    /// A second concurrent request on a channel whose slot is occupied.
    #[error("channel {0} already has a pending request")]
    ChannelBusy(String),

    /// A batch arrived for a channel nobody is awaiting.
    #[error("no waiter registered for channel {0}")]
    NoWaiter(String),

    /// The waiter went away (cancelled turn) before the batch was consumed.
    #[error("waiter for channel {0} gone before batch was consumed")]
    WaiterGone(String),
}

type SlotMap = Arc<DashMap<String, mpsc::Sender<ResultBatch>>>;

/// Registry of per-channel pending-result slots.
///
/// This is the only state shared between the collaborator's inbound callback
/// and the turn execution path; the map gives per-entry exclusion, channels
/// never contend with each other.
#[derive(Default)]
pub struct ResponseMultiplexer {
    slots: SlotMap,
}

impl ResponseMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the channel's slot for one in-flight request.
    ///
    /// The returned waiter releases the slot on drop, so a cancelled turn
    /// can never leave the channel permanently occupied.
    pub fn register(&self, channel_id: &str) -> Result<ChannelWaiter, CorrelationError> {
        match self.slots.entry(channel_id.to_string()) {
            Entry::Occupied(_) => {
                log::warn!("[{}] rejected concurrent registration", channel_id);
                Err(CorrelationError::ChannelBusy(channel_id.to_string()))
            }
            Entry::Vacant(vacant) => {
                let (tx, rx) = mpsc::channel(1);
                vacant.insert(tx);
                log::debug!("[{}] waiter registered", channel_id);
                Ok(ChannelWaiter {
                    channel_id: channel_id.to_string(),
                    rx,
                    slots: Arc::clone(&self.slots),
                })
            }
        }
    }

    /// Deliver a result batch to the channel's waiter.
    ///
    /// Suspends while the previous batch is still unconsumed (the mailbox
    /// has capacity one).
    pub async fn publish(
        &self,
        channel_id: &str,
        batch: ResultBatch,
    ) -> Result<(), CorrelationError> {
        // Clone the sender out of the map; holding the shard lock across
        // the send would block unrelated channels on the same shard.
        let tx = match self.slots.get(channel_id) {
            Some(entry) => entry.value().clone(),
            None => {
                log::warn!("[{}] batch published with no waiter", channel_id);
                return Err(CorrelationError::NoWaiter(channel_id.to_string()));
            }
        };

        tx.send(batch).await.map_err(|_| {
            log::warn!("[{}] waiter gone before batch was consumed", channel_id);
            CorrelationError::WaiterGone(channel_id.to_string())
        })
    }

    pub fn has_waiter(&self, channel_id: &str) -> bool {
        self.slots.contains_key(channel_id)
    }
}

/// Exclusive receiving half of one channel's pending-result slot.
#[derive(Debug)]
pub struct ChannelWaiter {
    channel_id: String,
    rx: mpsc::Receiver<ResultBatch>,
    slots: SlotMap,
}

impl ChannelWaiter {
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Suspend until the collaborator publishes the next batch.
    pub async fn next_batch(&mut self) -> Option<ResultBatch> {
        self.rx.recv().await
    }
}

impl Drop for ChannelWaiter {
    fn drop(&mut self) {
        self.slots.remove(&self.channel_id);
        log::debug!("[{}] waiter released", self.channel_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_core::ResultRecord;

    #[tokio::test]
    async fn publish_resolves_registered_waiter() {
        let mux = Arc::new(ResponseMultiplexer::new());
        let mut waiter = mux.register("c1").unwrap();

        mux.publish("c1", vec![ResultRecord::closing("done")])
            .await
            .unwrap();

        let batch = waiter.next_batch().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batch[0].is_final);
    }

    #[tokio::test]
    async fn publish_without_waiter_is_a_protocol_error() {
        let mux = Arc::new(ResponseMultiplexer::new());

        let err = mux
            .publish("c1", vec![ResultRecord::closing("orphan")])
            .await
            .unwrap_err();
        assert_eq!(err, CorrelationError::NoWaiter("c1".to_string()));
    }

    #[tokio::test]
    async fn second_registration_on_busy_channel_fails() {
        let mux = Arc::new(ResponseMultiplexer::new());
        let _waiter = mux.register("c1").unwrap();

        let err = mux.register("c1").unwrap_err();
        assert_eq!(err, CorrelationError::ChannelBusy("c1".to_string()));

        // A different channel is unaffected.
        mux.register("c2").unwrap();
    }

    #[tokio::test]
    async fn dropping_the_waiter_vacates_the_slot() {
        let mux = Arc::new(ResponseMultiplexer::new());
        let waiter = mux.register("c1").unwrap();
        assert!(mux.has_waiter("c1"));

        drop(waiter);
        assert!(!mux.has_waiter("c1"));

        // Publishing after release is the no-waiter protocol error again.
        let err = mux
            .publish("c1", vec![ResultRecord::closing("late")])
            .await
            .unwrap_err();
        assert_eq!(err, CorrelationError::NoWaiter("c1".to_string()));

        // And the channel can be claimed for the next request.
        mux.register("c1").unwrap();
    }

    #[tokio::test]
    async fn publisher_suspends_until_previous_batch_consumed() {
        let mux = Arc::new(ResponseMultiplexer::new());
        let mut waiter = mux.register("c1").unwrap();

        let publisher = {
            let mux = Arc::clone(&mux);
            tokio::spawn(async move {
                mux.publish("c1", vec![ResultRecord::partial("p1")])
                    .await
                    .unwrap();
                mux.publish("c1", vec![ResultRecord::closing("p2")])
                    .await
                    .unwrap();
            })
        };

        let first = waiter.next_batch().await.unwrap();
        assert_eq!(first[0].payload, serde_json::json!("p1"));
        let second = waiter.next_batch().await.unwrap();
        assert!(second[0].is_final);

        publisher.await.unwrap();
    }
}
