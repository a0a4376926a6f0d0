//! Subscriber fan-out (§4.5, §5): a `job_id → Vec<Sender>` map behind a
//! single `RwLock`, reader-preferred as the spec requires (`broadcast`
//! takes a read lock, `subscribe`/`unsubscribe` take a write lock). Each
//! subscriber gets its own bounded `mpsc` channel rather than a shared
//! `tokio::sync::broadcast` so a slow reader only drops its own events
//! (`try_send` on a full channel) instead of forcing every subscriber to
//! skip ahead together.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::warn;
use uuid::Uuid;

use crate::types::JobEvent;

pub const SUBSCRIBER_CHANNEL_CAPACITY: usize = 100;

#[derive(Clone)]
pub struct SubscriberId(u64);

struct Subscriber {
	id: u64,
	sender: mpsc::Sender<JobEvent>,
}

#[derive(Default)]
pub struct SubscriberRegistry {
	channels: RwLock<HashMap<Uuid, Vec<Subscriber>>>,
	next_id: std::sync::atomic::AtomicU64,
}

impl SubscriberRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	#[tracing::instrument(skip(self))]
	pub async fn subscribe(&self, job_id: Uuid) -> (SubscriberId, mpsc::Receiver<JobEvent>) {
		let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
		let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
		let mut channels = self.channels.write().await;
		channels.entry(job_id).or_default().push(Subscriber { id, sender: tx });
		(SubscriberId(id), rx)
	}

	#[tracing::instrument(skip(self, subscriber))]
	pub async fn unsubscribe(&self, job_id: Uuid, subscriber: SubscriberId) {
		let mut channels = self.channels.write().await;
		if let Some(subs) = channels.get_mut(&job_id) {
			subs.retain(|s| s.id != subscriber.0);
			if subs.is_empty() {
				channels.remove(&job_id);
			}
		}
	}

	/// Non-blocking send to every current subscriber of `event.job_id()`;
	/// a full or closed channel drops the event rather than backing up the
	/// producer (§5's drop-on-full back-pressure policy).
	#[tracing::instrument(skip(self, event), fields(job_id = %event.job_id(), kind = event.event_name()))]
	pub async fn broadcast(&self, event: JobEvent) {
		let job_id = event.job_id();
        let channels = self.channels.read().await;
		let Some(subs) = channels.get(&job_id) else {
			return;
		};
		for sub in subs {
			match sub.sender.try_send(event.clone()) {
				Ok(()) => {}
				Err(mpsc::error::TrySendError::Full(_)) => {
					warn!(%job_id, subscriber = sub.id, "dropping ci job event, subscriber queue full");
				}
				Err(mpsc::error::TrySendError::Closed(_)) => {}
			}
		}
	}

	pub async fn subscriber_count(&self, job_id: Uuid) -> usize {
		self.channels.read().await.get(&job_id).map(|s| s.len()).unwrap_or(0)
	}
}

pub type SharedSubscriberRegistry = Arc<SubscriberRegistry>;

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;

	#[tokio::test]
	async fn broadcast_reaches_subscribed_receiver() {
		let registry = SubscriberRegistry::new();
		let job_id = Uuid::new_v4();
		let (_id, mut rx) = registry.subscribe(job_id).await;

		registry
			.broadcast(JobEvent::Status {
				job_id,
				timestamp: Utc::now(),
				data: serde_json::json!({"status": "running"}),
			})
			.await;

		let event = rx.recv().await.unwrap();
		assert_eq!(event.job_id(), job_id);
		assert_eq!(event.event_name(), "status");
	}

	#[tokio::test]
	async fn unsubscribe_stops_delivery() {
		let registry = SubscriberRegistry::new();
		let job_id = Uuid::new_v4();
		let (id, mut rx) = registry.subscribe(job_id).await;
		registry.unsubscribe(job_id, id).await;

		registry
			.broadcast(JobEvent::Connected { job_id, timestamp: Utc::now() })
			.await;

		assert_eq!(registry.subscriber_count(job_id).await, 0);
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test]
	async fn full_queue_drops_without_blocking() {
		let registry = SubscriberRegistry::new();
		let job_id = Uuid::new_v4();
		let (_id, _rx) = registry.subscribe(job_id).await;

		for _ in 0..(SUBSCRIBER_CHANNEL_CAPACITY + 10) {
			registry
				.broadcast(JobEvent::Log {
					job_id,
					timestamp: Utc::now(),
					data: serde_json::json!({"line": "x"}),
				})
				.await;
		}
		// No panic, no deadlock: producer never blocks on a full queue.
	}
}
