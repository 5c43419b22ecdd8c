//! One dispatcher instance per store, with safe concurrent acquisition and shutdown.

// std
use std::{collections::HashMap, sync::OnceLock};
// crates.io
use tokio::sync::Mutex;
// self
use crate::{
	_prelude::*,
	dispatcher::{Dispatcher, DispatcherOptions},
	store::WebhookStore,
};

/// Keeps at most one running [`Dispatcher`] per distinct store instance.
///
/// Store identity is the `Arc` pointer of the injected [`WebhookStore`] trait object,
/// mirroring a dispatcher map keyed by store object identity.
#[derive(Clone, Default)]
pub struct DispatcherRegistry {
	dispatchers: Arc<Mutex<HashMap<usize, Dispatcher>>>,
}
impl DispatcherRegistry {
	/// Build an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Return the dispatcher for `store`, creating and starting one if none exists.
	///
	/// `options` only take effect on the first call for a given store; a dispatcher
	/// already running for that store is returned unchanged.
	pub async fn get_dispatcher(
		&self,
		store: Arc<dyn WebhookStore>,
		options: DispatcherOptions,
	) -> Result<Dispatcher> {
		let key = store_key(&store);
		let mut dispatchers = self.dispatchers.lock().await;

		if let Some(dispatcher) = dispatchers.get(&key) {
			return Ok(dispatcher.clone());
		}

		let dispatcher = Dispatcher::new(store, options)?;

		dispatcher.start().await;
		dispatchers.insert(key, dispatcher.clone());

		Ok(dispatcher)
	}

	/// Stop and forget the dispatcher registered for `store`, if any.
	pub async fn shutdown(&self, store: &Arc<dyn WebhookStore>) {
		let key = store_key(store);
		let dispatcher = self.dispatchers.lock().await.remove(&key);

		if let Some(dispatcher) = dispatcher {
			dispatcher.stop().await;
		}
	}

	/// Stop and forget every dispatcher currently tracked.
	pub async fn shutdown_all(&self) {
		let dispatchers: Vec<Dispatcher> =
			self.dispatchers.lock().await.drain().map(|(_, dispatcher)| dispatcher).collect();

		for dispatcher in dispatchers {
			dispatcher.stop().await;
		}
	}
}

fn store_key(store: &Arc<dyn WebhookStore>) -> usize {
	Arc::as_ptr(store) as *const () as usize
}

/// Process-wide registry, lazily initialized on first use.
static GLOBAL: OnceLock<DispatcherRegistry> = OnceLock::new();

fn global() -> &'static DispatcherRegistry {
	GLOBAL.get_or_init(DispatcherRegistry::new)
}

/// Return the process-wide dispatcher for `store`, creating and starting one if needed.
pub async fn get_dispatcher(store: Arc<dyn WebhookStore>, options: DispatcherOptions) -> Result<Dispatcher> {
	global().get_dispatcher(store, options).await
}

/// Stop and forget the process-wide dispatcher registered for `store`, if any.
pub async fn shutdown_dispatcher(store: &Arc<dyn WebhookStore>) {
	global().shutdown(store).await;
}

/// Stop and forget every process-wide dispatcher currently tracked.
pub async fn shutdown_all_dispatchers() {
	global().shutdown_all().await;
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::InMemoryWebhookStore;

	#[tokio::test]
	async fn returns_the_same_dispatcher_for_the_same_store() {
		let registry = DispatcherRegistry::new();
		let store: Arc<dyn WebhookStore> = Arc::new(InMemoryWebhookStore::new());
		let first = registry.get_dispatcher(store.clone(), DispatcherOptions::new()).await.unwrap();
		let second = registry.get_dispatcher(store.clone(), DispatcherOptions::new()).await.unwrap();

		assert_eq!(first.queue_len().await, second.queue_len().await);

		registry.shutdown_all().await;
	}

	#[tokio::test]
	async fn distinct_stores_get_distinct_dispatchers() {
		let registry = DispatcherRegistry::new();
		let store_a: Arc<dyn WebhookStore> = Arc::new(InMemoryWebhookStore::new());
		let store_b: Arc<dyn WebhookStore> = Arc::new(InMemoryWebhookStore::new());

		registry.get_dispatcher(store_a.clone(), DispatcherOptions::new()).await.unwrap();
		registry.get_dispatcher(store_b.clone(), DispatcherOptions::new()).await.unwrap();

		assert_eq!(registry.dispatchers.lock().await.len(), 2);

		registry.shutdown_all().await;
	}

	#[tokio::test]
	async fn shutdown_removes_and_stops_the_dispatcher() {
		let registry = DispatcherRegistry::new();
		let store: Arc<dyn WebhookStore> = Arc::new(InMemoryWebhookStore::new());

		registry.get_dispatcher(store.clone(), DispatcherOptions::new()).await.unwrap();
		registry.shutdown(&store).await;

		assert_eq!(registry.dispatchers.lock().await.len(), 0);
	}
}
