//! Webhook cache snapshot and observability types.

// self
use crate::{_prelude::*, model::Webhook};

/// Immutable-by-convention snapshot of the webhook set, replaced atomically on refresh.
#[derive(Clone, Debug, Default)]
pub struct CacheSnapshot {
	/// Full set of webhooks as of the last successful refresh.
	pub webhooks: Vec<Webhook>,
	/// Wall-clock time of the last successful refresh, if any.
	pub last_refresh: Option<DateTime<Utc>>,
}
impl CacheSnapshot {
	/// Webhooks whose `should_trigger(event_type)` is true.
	pub fn active_for_event(&self, event_type: &str) -> Vec<Webhook> {
		self.webhooks.iter().filter(|webhook| webhook.should_trigger(event_type)).cloned().collect()
	}
}

/// Observability projection of the cache's internal state.
#[derive(Clone, Debug)]
pub struct CacheInfo {
	/// Number of webhooks currently held in the snapshot.
	pub count: usize,
	/// Wall-clock time of the last successful refresh.
	pub last_refresh: Option<DateTime<Utc>>,
	/// Age of the current snapshot, if it has ever been refreshed.
	pub age: Option<Duration>,
	/// Configured interval between background refreshes.
	pub interval: Duration,
	/// Whether the background refresher is currently running.
	pub running: bool,
	/// Whether a store capability is currently bound.
	pub has_store: bool,
}
