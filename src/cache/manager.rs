//! Background-refreshed cache of active webhooks.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// crates.io
use tokio::{
	sync::{Notify, RwLock},
	task::JoinHandle,
	time,
};
// self
use crate::{
	_prelude::*,
	cache::state::{CacheInfo, CacheSnapshot},
	model::Webhook,
	store::WebhookStore,
};

/// Default interval between background refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Holds the most recently refreshed set of webhooks and, optionally, a
/// background task that keeps it current.
///
/// Cloning is cheap; all clones share the same snapshot and background task.
#[derive(Clone)]
pub struct WebhookCache {
	inner: Arc<Inner>,
}
struct Inner {
	store: RwLock<Option<Arc<dyn WebhookStore>>>,
	snapshot: RwLock<CacheSnapshot>,
	refresh_interval: Duration,
	running: AtomicBool,
	shutdown: Notify,
	task: std::sync::Mutex<Option<JoinHandle<()>>>,
}
impl WebhookCache {
	/// Build a cache that refreshes every `refresh_interval`.
	pub fn new(refresh_interval: Duration) -> Self {
		Self {
			inner: Arc::new(Inner {
				store: RwLock::new(None),
				snapshot: RwLock::new(CacheSnapshot::default()),
				refresh_interval,
				running: AtomicBool::new(false),
				shutdown: Notify::new(),
				task: std::sync::Mutex::new(None),
			}),
		}
	}

	/// Bind (or rebind) the store this cache refreshes from.
	///
	/// Rebinding to a different store forces an immediate synchronous refresh so
	/// the cache never serves the previous store's data under the new identity.
	pub async fn set_store(&self, store: Arc<dyn WebhookStore>) {
		let changed = {
			let mut guard = self.inner.store.write().await;
			let changed = match &*guard {
				Some(existing) => !Arc::ptr_eq(existing, &store),
				None => true,
			};

			*guard = Some(store);

			changed
		};

		if changed {
			self.refresh().await;
		}
	}

	/// Active webhooks subscribed to `event_type`, as of the last refresh.
	pub async fn get_active_for_event(&self, event_type: &str) -> Vec<Webhook> {
		self.inner.snapshot.read().await.active_for_event(event_type)
	}

	/// Synchronously walk the bound store to completion and swap in a fresh snapshot.
	///
	/// A missing store or a store error leaves the existing snapshot untouched; the
	/// latter is logged and swallowed so a transient outage does not stop dispatch.
	pub async fn refresh(&self) {
		let store = { self.inner.store.read().await.clone() };
		let Some(store) = store else {
			tracing::debug!("webhook cache refresh skipped: no store bound");

			return;
		};

		match Self::list_all(store.as_ref()).await {
			Ok(webhooks) => {
				let count = webhooks.len();
				let mut guard = self.inner.snapshot.write().await;

				*guard = CacheSnapshot { webhooks, last_refresh: Some(Utc::now()) };

				tracing::debug!(count, "webhook cache refreshed");
			},
			Err(err) => {
				tracing::warn!(error = %err, "webhook cache refresh failed; serving stale data");
			},
		}
	}

	async fn list_all(store: &dyn WebhookStore) -> Result<Vec<Webhook>> {
		let mut webhooks = Vec::new();
		let mut page_token = None;

		loop {
			let (page, next_page_token) = store.list_webhooks(None, page_token.as_deref()).await?;

			webhooks.extend(page);

			match next_page_token {
				Some(token) => page_token = Some(token),
				None => break,
			}
		}

		Ok(webhooks)
	}

	/// Observability snapshot of cache state.
	pub async fn info(&self) -> CacheInfo {
		let snapshot = self.inner.snapshot.read().await;
		let age = snapshot.last_refresh.map(|at| {
			(Utc::now() - at).to_std().unwrap_or_default()
		});

		CacheInfo {
			count: snapshot.webhooks.len(),
			last_refresh: snapshot.last_refresh,
			age,
			interval: self.inner.refresh_interval,
			running: self.inner.running.load(Ordering::SeqCst),
			has_store: self.inner.store.read().await.is_some(),
		}
	}

	/// Start the background refresh loop, if not already running.
	pub fn start(&self) {
		if self.inner.running.swap(true, Ordering::SeqCst) {
			return;
		}

		let cache = self.clone();
		let handle = tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = time::sleep(cache.inner.refresh_interval) => {
						cache.refresh().await;
					},
					_ = cache.inner.shutdown.notified() => break,
				}
			}
		});

		*self.inner.task.lock().expect("cache task mutex poisoned") = Some(handle);
	}

	/// Stop the background refresh loop and wait for it to exit.
	pub async fn stop(&self) {
		if !self.inner.running.swap(false, Ordering::SeqCst) {
			return;
		}

		self.inner.shutdown.notify_one();

		let handle = self.inner.task.lock().expect("cache task mutex poisoned").take();

		if let Some(handle) = handle {
			let _ = handle.await;
		}
	}
}
