//! The registry store capability consumed by the cache and failure policy.

// std
use std::collections::HashMap;
// crates.io
use async_trait::async_trait;
use tokio::sync::Mutex;
// self
use crate::{_prelude::*, model::Webhook, model::WebhookStatus};

/// Capability the dispatch core needs from the registry's persistence layer.
///
/// Production call sites implement this against the real model-registry store;
/// this crate's [`InMemoryWebhookStore`] is a reference implementation used by
/// tests, doc examples, and embedding applications that have not wired a real
/// store yet.
#[async_trait]
pub trait WebhookStore: Send + Sync {
	/// List webhooks, walked to completion by the caller using `next_page_token`.
	async fn list_webhooks(
		&self,
		max_results: Option<u32>,
		page_token: Option<&str>,
	) -> Result<(Vec<Webhook>, Option<String>)>;

	/// Update a webhook's status, returning the updated entity.
	async fn update_webhook(&self, webhook_id: &str, status: WebhookStatus) -> Result<Webhook>;
}

/// In-memory [`WebhookStore`] used by tests, examples, and early integrations.
#[derive(Debug, Default)]
pub struct InMemoryWebhookStore {
	webhooks: Mutex<HashMap<String, Webhook>>,
}
impl InMemoryWebhookStore {
	/// Construct an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Seed the store with an initial set of webhooks.
	pub fn with_webhooks(webhooks: impl IntoIterator<Item = Webhook>) -> Self {
		let store = Self::new();

		{
			let mut guard = store.webhooks.try_lock().expect("uncontended during construction");

			for webhook in webhooks {
				guard.insert(webhook.id.clone(), webhook);
			}
		}

		store
	}

	/// Insert or replace a webhook.
	pub async fn upsert(&self, webhook: Webhook) {
		self.webhooks.lock().await.insert(webhook.id.clone(), webhook);
	}

	/// Remove a webhook by id.
	pub async fn remove(&self, webhook_id: &str) {
		self.webhooks.lock().await.remove(webhook_id);
	}
}
#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
	async fn list_webhooks(
		&self,
		max_results: Option<u32>,
		page_token: Option<&str>,
	) -> Result<(Vec<Webhook>, Option<String>)> {
		let guard = self.webhooks.lock().await;
		let mut all: Vec<Webhook> = guard.values().cloned().collect();

		all.sort_by(|a, b| a.id.cmp(&b.id));

		let start = page_token.and_then(|token| token.parse::<usize>().ok()).unwrap_or(0);
		let page_size = max_results.map(|n| n as usize).unwrap_or(all.len().max(1));
		let end = (start + page_size).min(all.len());
		let page = all.get(start..end).unwrap_or_default().to_vec();
		let next_page_token = if end < all.len() { Some(end.to_string()) } else { None };

		Ok((page, next_page_token))
	}

	async fn update_webhook(&self, webhook_id: &str, status: WebhookStatus) -> Result<Webhook> {
		let mut guard = self.webhooks.lock().await;
		let webhook = guard.get_mut(webhook_id).ok_or_else(|| Error::Store(format!(
			"no such webhook: {webhook_id}"
		)))?;

		webhook.status = status;
		webhook.updated_at = Utc::now().timestamp_millis();

		Ok(webhook.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn webhook(id: &str, status: WebhookStatus) -> Webhook {
		Webhook {
			id: id.into(),
			name: id.into(),
			description: None,
			url: "https://example.com/hook".into(),
			events: vec!["MODEL_VERSION_CREATED".into()],
			status,
			secret: None,
			created_at: 0,
			updated_at: 0,
		}
	}

	#[tokio::test]
	async fn list_webhooks_paginates_to_completion() {
		let store = InMemoryWebhookStore::with_webhooks((0..5).map(|i| {
			webhook(&format!("wh-{i}"), WebhookStatus::Active)
		}));
		let mut collected = Vec::new();
		let mut page_token = None;

		loop {
			let (page, next) = store.list_webhooks(Some(2), page_token.as_deref()).await.unwrap();

			collected.extend(page);

			match next {
				Some(token) => page_token = Some(token),
				None => break,
			}
		}

		assert_eq!(collected.len(), 5);
	}

	#[tokio::test]
	async fn update_webhook_changes_status() {
		let store = InMemoryWebhookStore::with_webhooks([webhook("wh-1", WebhookStatus::Active)]);
		let updated = store.update_webhook("wh-1", WebhookStatus::Disabled).await.unwrap();

		assert_eq!(updated.status, WebhookStatus::Disabled);
	}
}
