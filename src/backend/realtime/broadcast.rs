/**
 * Topic Broadcasting
 *
 * Every realtime topic owns one `tokio::sync::broadcast` channel. Presence
 * diffs, presence syncs and client broadcasts are all published on it, so
 * every subscriber observes them in the same total order.
 *
 * Each subscription drains its broadcast receiver on a small forwarding task
 * that drops the subscriber's own broadcasts and hands the rest to an
 * unbounded queue owned by the subscriber.
 */

use crate::backend::realtime::channel::ChannelEvent;
use tokio::sync::{broadcast, mpsc};

/// Buffered events per topic before slow subscribers start lagging
pub const TOPIC_CAPACITY: usize = 1024;

/// Origin used for events raised by the service itself
pub const SERVICE_ORIGIN: u64 = 0;

/// Event published on a topic, tagged with the subscription that raised it
#[derive(Debug, Clone)]
pub struct TopicEnvelope {
    pub origin: u64,
    pub event: ChannelEvent,
}

/// Broadcast sender for one topic
pub type TopicBroadcast = broadcast::Sender<TopicEnvelope>;

/// Publish an envelope to every subscriber of a topic
///
/// # Returns
///
/// Number of active receivers that got the event (0 if nobody is listening)
pub fn broadcast_event(topic_tx: &TopicBroadcast, envelope: TopicEnvelope) -> usize {
    match topic_tx.send(envelope) {
        Ok(subscriber_count) => {
            tracing::debug!("[Realtime] Event broadcast to {} subscribers", subscriber_count);
            subscriber_count
        }
        Err(e) => {
            // No subscribers, that's okay
            tracing::debug!("[Realtime] No subscribers to receive event: {:?}", e.0.event);
            0
        }
    }
}

/// Drain a topic receiver into one subscriber's queue.
///
/// Stops when the subscriber's queue is dropped, after forwarding a
/// `Closed` event, or when the topic itself goes away.
pub async fn forward_topic_events(
    mut rx: broadcast::Receiver<TopicEnvelope>,
    subscription_id: u64,
    echo_broadcasts: bool,
    out: mpsc::UnboundedSender<ChannelEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(envelope) => {
                let own_broadcast = envelope.origin == subscription_id
                    && matches!(envelope.event, ChannelEvent::Broadcast { .. });
                if own_broadcast && !echo_broadcasts {
                    continue;
                }

                let closing = matches!(envelope.event, ChannelEvent::Closed { .. });
                if out.send(envelope.event).is_err() {
                    tracing::debug!("[Realtime] Subscriber {} went away, stopping forwarder", subscription_id);
                    return;
                }
                if closing {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("[Realtime] Subscriber {} lagged, skipped {} events", subscription_id, skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                let _ = out.send(ChannelEvent::Closed {
                    reason: "topic closed".to_string(),
                });
                return;
            }
        }
    }
}
