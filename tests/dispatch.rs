//! End-to-end coverage of the dispatch pipeline against a mock HTTP endpoint.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use webhook_dispatch::{Dispatcher, DispatcherOptions, InMemoryWebhookStore, Webhook, WebhookStatus, event_type};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{header_exists, method, path},
};

fn webhook(id: &str, url: &str, events: &[&str], secret: Option<&str>) -> Webhook {
	Webhook {
		id: id.into(),
		name: id.into(),
		description: None,
		url: url.into(),
		events: events.iter().map(|e| e.to_string()).collect(),
		status: WebhookStatus::Active,
		secret: secret.map(Into::into),
		created_at: 0,
		updated_at: 0,
	}
}

#[tokio::test]
async fn fans_out_to_every_subscribed_recipient() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/a"))
		.and(header_exists("x-mlflow-signature"))
		.respond_with(ResponseTemplate::new(200))
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("POST")).and(path("/b")).respond_with(ResponseTemplate::new(200)).expect(1).mount(&server).await;

	let store = Arc::new(InMemoryWebhookStore::with_webhooks([
		webhook("wh-a", &format!("{}/a", server.uri()), &[event_type::MODEL_VERSION_CREATED], Some("s3cr3t")),
		webhook("wh-b", &format!("{}/b", server.uri()), &[event_type::MODEL_VERSION_CREATED], None),
		webhook("wh-c", &format!("{}/a", server.uri()), &[event_type::MODEL_ALIAS_SET], None),
	]));
	let dispatcher = Dispatcher::new(
		store,
		DispatcherOptions::new().allowed_schemes(["http"]).cache_refresh_interval(Duration::from_secs(3600)),
	)
	.unwrap();

	dispatcher.start().await;
	dispatcher
		.dispatch(event_type::MODEL_VERSION_CREATED, serde_json::json!({"version_id": "v1"}))
		.await;

	tokio::time::sleep(Duration::from_millis(200)).await;

	server.verify().await;

	dispatcher.stop().await;
}

#[tokio::test]
async fn retries_a_transient_failure_then_succeeds() {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/hook"))
		.respond_with(ResponseTemplate::new(503))
		.up_to_n_times(1)
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("POST")).and(path("/hook")).respond_with(ResponseTemplate::new(200)).expect(1).mount(&server).await;

	let url = format!("{}/hook", server.uri());
	let store = Arc::new(InMemoryWebhookStore::with_webhooks([webhook(
		"wh-1",
		&url,
		&[event_type::MODEL_VERSION_CREATED],
		None,
	)]));
	let dispatcher = Dispatcher::new(
		store,
		DispatcherOptions::new().allowed_schemes(["http"]).cache_refresh_interval(Duration::from_secs(3600)),
	)
	.unwrap();

	dispatcher.start().await;
	dispatcher.dispatch(event_type::MODEL_VERSION_CREATED, serde_json::json!({})).await;

	tokio::time::sleep(Duration::from_secs(2)).await;

	server.verify().await;
	assert_eq!(dispatcher.failure_counts().await.get("wh-1"), None);

	dispatcher.stop().await;
}

#[tokio::test]
async fn rejects_a_disallowed_scheme_without_any_http_call() {
	let server = MockServer::start().await;

	Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

	let url = format!("{}/hook", server.uri()).replacen("http://", "ftp://", 1);
	let store = Arc::new(InMemoryWebhookStore::with_webhooks([webhook(
		"wh-1",
		&url,
		&[event_type::MODEL_VERSION_CREATED],
		None,
	)]));
	let dispatcher = Dispatcher::new(store, DispatcherOptions::new().cache_refresh_interval(Duration::from_secs(3600))).unwrap();

	dispatcher.start().await;
	dispatcher.dispatch(event_type::MODEL_VERSION_CREATED, serde_json::json!({})).await;

	tokio::time::sleep(Duration::from_millis(200)).await;

	server.verify().await;

	dispatcher.stop().await;
}

#[tokio::test]
async fn an_oversized_payload_is_rejected_before_any_http_call() {
	let server = MockServer::start().await;

	Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

	let url = format!("{}/hook", server.uri());
	let store = Arc::new(InMemoryWebhookStore::with_webhooks([webhook(
		"wh-1",
		&url,
		&[event_type::MODEL_VERSION_CREATED],
		None,
	)]));
	let dispatcher = Dispatcher::new(
		store,
		DispatcherOptions::new()
			.allowed_schemes(["http"])
			.cache_refresh_interval(Duration::from_secs(3600))
			.max_payload_size(16),
	)
	.unwrap();

	dispatcher.start().await;
	dispatcher
		.dispatch(event_type::MODEL_VERSION_CREATED, serde_json::json!({"description": "far more than sixteen bytes"}))
		.await;

	tokio::time::sleep(Duration::from_millis(200)).await;

	server.verify().await;

	dispatcher.stop().await;
}

#[tokio::test]
async fn a_webhook_registered_after_start_is_picked_up_on_the_next_refresh() {
	let server = MockServer::start().await;

	Mock::given(method("POST")).and(path("/hook")).respond_with(ResponseTemplate::new(200)).expect(1).mount(&server).await;

	let url = format!("{}/hook", server.uri());
	let store = Arc::new(InMemoryWebhookStore::new());
	let dispatcher = Dispatcher::new(
		store.clone(),
		DispatcherOptions::new().allowed_schemes(["http"]).cache_refresh_interval(Duration::from_millis(50)),
	)
	.unwrap();

	dispatcher.start().await;
	dispatcher.dispatch(event_type::MODEL_VERSION_CREATED, serde_json::json!({})).await;

	tokio::time::sleep(Duration::from_millis(100)).await;

	store.upsert(webhook("wh-late", &url, &[event_type::MODEL_VERSION_CREATED], None)).await;

	tokio::time::sleep(Duration::from_millis(150)).await;

	dispatcher.dispatch(event_type::MODEL_VERSION_CREATED, serde_json::json!({})).await;

	tokio::time::sleep(Duration::from_millis(150)).await;

	server.verify().await;

	dispatcher.stop().await;
}
