//! The bounded task queue, worker pool, and public dispatch entry point.

// std
use std::{collections::HashMap, sync::atomic::{AtomicBool, AtomicUsize, Ordering}};
// crates.io
use reqwest::Client;
use tokio::{
	sync::{Mutex, mpsc},
	task::JoinHandle,
	time,
};
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	cache::manager::{DEFAULT_REFRESH_INTERVAL, WebhookCache},
	cache::state::CacheInfo,
	dispatch::{
		self, DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_RESPONSE_BODY_CAPTURE,
		DEFAULT_TIMEOUT_SECONDS, DispatchErrorKind, DispatchTask, MAX_PAYLOAD_SIZE, MAX_RETRY_COUNT,
		RETRY_DELAYS,
	},
	http::{
		client::{SenderOptions, send_webhook},
		retry::{self, RetryDecision, RetrySchedule},
	},
	model::WebhookStatus,
	store::WebhookStore,
};
#[cfg(feature = "metrics")]
use crate::metrics::{self, DispatchMetrics};

/// Default worker-pool size.
pub const DEFAULT_MAX_WORKERS: usize = 5;
/// Default bounded queue capacity.
pub const DEFAULT_QUEUE_SIZE: usize = 1000;
/// Bounded wait for worker tasks to drain on shutdown.
pub const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for a [`Dispatcher`] instance, supplied programmatically.
#[derive(Clone, Debug)]
pub struct DispatcherOptions {
	/// URL schemes accepted for outbound calls.
	pub allowed_schemes: Vec<String>,
	/// Worker-pool size.
	pub max_workers: usize,
	/// Bounded queue capacity.
	pub queue_size: usize,
	/// Whether repeated terminal failures disable a webhook via the store.
	pub auto_disable_on_failure: bool,
	/// Interval between cache refreshes.
	pub cache_refresh_interval: Duration,
	/// Retries after the first failed attempt.
	pub max_retry_count: u32,
	/// Backoff delay indexed by retry count.
	pub retry_delays: Vec<Duration>,
	/// Consecutive terminal failures before auto-disable.
	pub max_consecutive_failures: u32,
	/// Per-attempt HTTP timeout, in seconds.
	pub default_timeout_seconds: u64,
	/// Maximum accepted envelope size, in bytes.
	pub max_payload_size: usize,
	/// Bytes of response body retained for diagnostics.
	pub response_body_capture: usize,
}
impl Default for DispatcherOptions {
	fn default() -> Self {
		Self {
			allowed_schemes: vec!["https".to_string()],
			max_workers: DEFAULT_MAX_WORKERS,
			queue_size: DEFAULT_QUEUE_SIZE,
			auto_disable_on_failure: true,
			cache_refresh_interval: DEFAULT_REFRESH_INTERVAL,
			max_retry_count: MAX_RETRY_COUNT,
			retry_delays: RETRY_DELAYS.iter().map(|secs| Duration::from_secs(*secs)).collect(),
			max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
			default_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
			max_payload_size: MAX_PAYLOAD_SIZE,
			response_body_capture: DEFAULT_RESPONSE_BODY_CAPTURE,
		}
	}
}
impl DispatcherOptions {
	/// Start from defaults.
	pub fn new() -> Self {
		Self::default()
	}

	/// Override the accepted URL schemes.
	pub fn allowed_schemes<I, S>(mut self, schemes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.allowed_schemes = schemes.into_iter().map(Into::into).collect();

		self
	}

	/// Override the worker-pool size.
	pub fn max_workers(mut self, value: usize) -> Self {
		self.max_workers = value;

		self
	}

	/// Override the bounded queue capacity.
	pub fn queue_size(mut self, value: usize) -> Self {
		self.queue_size = value;

		self
	}

	/// Enable or disable the auto-disable policy.
	pub fn auto_disable_on_failure(mut self, value: bool) -> Self {
		self.auto_disable_on_failure = value;

		self
	}

	/// Override the cache refresh interval.
	pub fn cache_refresh_interval(mut self, value: Duration) -> Self {
		self.cache_refresh_interval = value;

		self
	}

	/// Override the consecutive-failure auto-disable threshold.
	pub fn max_consecutive_failures(mut self, value: u32) -> Self {
		self.max_consecutive_failures = value;

		self
	}

	/// Override the per-attempt HTTP timeout, in seconds.
	pub fn default_timeout_seconds(mut self, value: u64) -> Self {
		self.default_timeout_seconds = value;

		self
	}

	/// Override the maximum accepted envelope size, in bytes.
	pub fn max_payload_size(mut self, value: usize) -> Self {
		self.max_payload_size = value;

		self
	}

	/// Override the captured response-body diagnostic size, in bytes.
	pub fn response_body_capture(mut self, value: usize) -> Self {
		self.response_body_capture = value;

		self
	}
}

/// Owns the bounded dispatch queue, worker pool, and public dispatch API.
///
/// Cloning is cheap; all clones share the same queue, cache, and failure counters.
#[derive(Clone)]
pub struct Dispatcher {
	inner: Arc<Inner>,
}
struct Inner {
	store: Arc<dyn WebhookStore>,
	cache: WebhookCache,
	client: Client,
	options: DispatcherOptions,
	sender: Mutex<Option<mpsc::Sender<DispatchTask>>>,
	receiver: Mutex<Option<Arc<Mutex<mpsc::Receiver<DispatchTask>>>>>,
	workers: Mutex<Vec<JoinHandle<()>>>,
	failure_counts: Mutex<HashMap<String, u32>>,
	running: AtomicBool,
	queue_depth: AtomicUsize,
	#[cfg(feature = "metrics")]
	metrics: Arc<DispatchMetrics>,
}
impl Dispatcher {
	/// Build a dispatcher bound to `store`, not yet started.
	pub fn new(store: Arc<dyn WebhookStore>, options: DispatcherOptions) -> Result<Self> {
		let client = Client::builder().build()?;
		let cache = WebhookCache::new(options.cache_refresh_interval);

		Ok(Self {
			inner: Arc::new(Inner {
				store,
				cache,
				client,
				options,
				sender: Mutex::new(None),
				receiver: Mutex::new(None),
				workers: Mutex::new(Vec::new()),
				failure_counts: Mutex::new(HashMap::new()),
				running: AtomicBool::new(false),
				queue_depth: AtomicUsize::new(0),
				#[cfg(feature = "metrics")]
				metrics: DispatchMetrics::new(),
			}),
		})
	}

	/// Start the cache refresher and worker pool. Idempotent.
	pub async fn start(&self) {
		if self.inner.running.swap(true, Ordering::SeqCst) {
			return;
		}

		self.inner.cache.set_store(self.inner.store.clone()).await;
		self.inner.cache.start();

		let (tx, rx) = mpsc::channel(self.inner.options.queue_size);
		let rx = Arc::new(Mutex::new(rx));

		*self.inner.sender.lock().await = Some(tx);
		*self.inner.receiver.lock().await = Some(rx.clone());

		let mut workers = Vec::with_capacity(self.inner.options.max_workers);

		for _ in 0..self.inner.options.max_workers {
			let inner = self.inner.clone();
			let rx = rx.clone();

			workers.push(tokio::spawn(async move {
				worker_loop(inner, rx).await;
			}));
		}

		*self.inner.workers.lock().await = workers;
	}

	/// Stop the worker pool and cache refresher, draining in-flight work. Idempotent.
	pub async fn stop(&self) {
		if !self.inner.running.swap(false, Ordering::SeqCst) {
			return;
		}

		// Dropping the sender closes the channel so blocked workers observe end-of-stream.
		self.inner.sender.lock().await.take();

		let workers = self.inner.workers.lock().await.drain(..).collect::<Vec<_>>();

		for worker in workers {
			if time::timeout(SHUTDOWN_JOIN_TIMEOUT, worker).await.is_err() {
				tracing::warn!("dispatcher worker did not exit within the shutdown deadline");
			}
		}

		self.inner.receiver.lock().await.take();
		self.inner.cache.stop().await;
	}

	/// Ask the cache for active recipients of `event_type` and enqueue one task per recipient.
	///
	/// Never blocks and never returns an error; a full queue drops the task for that one
	/// recipient with a warning log, and a webhook's own failure counter is left untouched
	/// (the drop happens before any attempt, so there is nothing to count against it).
	pub async fn dispatch(&self, event_type: &str, data: serde_json::Value) {
		if !self.inner.running.load(Ordering::SeqCst) {
			tracing::debug!(event_type, "dispatch called while stopped; ignoring");

			return;
		}

		let recipients = self.inner.cache.get_active_for_event(event_type).await;
		let sender = self.inner.sender.lock().await.clone();
		let Some(sender) = sender else { return };

		for webhook in recipients {
			let delivery_id = Uuid::new_v4().to_string();
			let envelope = dispatch::build_envelope(event_type, data.clone(), delivery_id);
			let task = DispatchTask {
				webhook: webhook.clone(),
				event_type: event_type.to_string(),
				envelope,
				retry_count: 0,
				created_at: Utc::now(),
			};

			match sender.try_send(task) {
				Ok(()) => {
					self.inner.queue_depth.fetch_add(1, Ordering::SeqCst);

					#[cfg(feature = "metrics")]
					{
						self.inner.metrics.record_enqueued();
						metrics::record_enqueued(&webhook.id);
					}
				},
				Err(_) => {
					tracing::warn!(webhook_id = %webhook.id, event_type, "dispatch queue full; dropping task");

					#[cfg(feature = "metrics")]
					metrics::record_queue_dropped(&webhook.id);
				},
			}
		}
	}

	/// Current number of tasks waiting in the queue.
	///
	/// Tracked with a separate counter rather than locking the receiver, since a
	/// worker parked in [`worker_loop`] on an empty queue holds that lock for as
	/// long as it is idle.
	pub async fn queue_len(&self) -> usize {
		self.inner.queue_depth.load(Ordering::SeqCst)
	}

	/// Snapshot of consecutive-failure counts, keyed by webhook id.
	pub async fn failure_counts(&self) -> HashMap<String, u32> {
		self.inner.failure_counts.lock().await.clone()
	}

	/// Delegate to the cache's observability projection.
	pub async fn cache_info(&self) -> CacheInfo {
		self.inner.cache.info().await
	}

	/// Delegate to the cache's on-demand refresh.
	pub async fn force_cache_refresh(&self) {
		self.inner.cache.refresh().await;
	}
}

async fn worker_loop(inner: Arc<Inner>, rx: Arc<Mutex<mpsc::Receiver<DispatchTask>>>) {
	loop {
		let task = {
			let mut guard = rx.lock().await;

			guard.recv().await
		};

		match task {
			Some(task) => {
				inner.queue_depth.fetch_sub(1, Ordering::SeqCst);
				process_task(&inner, task).await;
			},
			None => break,
		}
	}
}

async fn process_task(inner: &Arc<Inner>, task: DispatchTask) {
	let options = SenderOptions {
		allowed_schemes: inner.options.allowed_schemes.clone().into(),
		max_payload_size: inner.options.max_payload_size,
		timeout: Duration::from_secs(inner.options.default_timeout_seconds),
		response_body_capture: inner.options.response_body_capture,
	};
	let webhook_id = task.webhook.id.clone();
	let delivery_id = task.delivery_id().to_string();
	let result = send_webhook(&inner.client, &task, &options).await;

	if result.success {
		inner.failure_counts.lock().await.remove(&webhook_id);

		#[cfg(feature = "metrics")]
		{
			inner.metrics.record_success();
			metrics::record_success(&webhook_id);
		}

		tracing::debug!(webhook_id, delivery_id, "delivery succeeded");

		return;
	}

	let kind = result.error.unwrap_or(DispatchErrorKind::Unexpected);
	let schedule =
		RetrySchedule { max_retry_count: inner.options.max_retry_count, delays: inner.options.retry_delays.clone() };

	match retry::decide(task.retry_count, kind, &schedule) {
		RetryDecision::Retry { delay } => {
			time::sleep(delay).await;

			let next = task.next_attempt();
			let sent = {
				let guard = inner.sender.lock().await;

				guard.as_ref().map(|tx| tx.try_send(next).is_ok()).unwrap_or(false)
			};

			if sent {
				inner.queue_depth.fetch_add(1, Ordering::SeqCst);

				#[cfg(feature = "metrics")]
				{
					inner.metrics.record_retry();
					metrics::record_retry(&webhook_id);
				}

				tracing::debug!(webhook_id, delivery_id, retry_count = task.retry_count, "delivery retried");
			} else {
				tracing::warn!(webhook_id, delivery_id, "retry dropped: queue full");

				#[cfg(feature = "metrics")]
				metrics::record_queue_dropped(&webhook_id);

				handle_terminal_failure(inner, &webhook_id).await;
			}
		},
		RetryDecision::GiveUp => {
			tracing::error!(webhook_id, delivery_id, kind = %kind, "delivery failed terminally");

			#[cfg(feature = "metrics")]
			{
				inner.metrics.record_failure();
				metrics::record_failure(&webhook_id);
			}

			handle_terminal_failure(inner, &webhook_id).await;
		},
	}
}

async fn handle_terminal_failure(inner: &Arc<Inner>, webhook_id: &str) {
	// Held across the store call below so two workers crossing the threshold at the
	// same time can't both disable the same webhook: whichever acquires the guard
	// first resets the counter before the other's check-and-disable can run.
	let mut counts = inner.failure_counts.lock().await;
	let current = {
		let count = counts.entry(webhook_id.to_string()).or_insert(0);

		*count += 1;
		*count
	};

	if !inner.options.auto_disable_on_failure || current < inner.options.max_consecutive_failures {
		return;
	}

	match inner.store.update_webhook(webhook_id, WebhookStatus::Disabled).await {
		Ok(_) => {
			counts.insert(webhook_id.to_string(), 0);
			inner.cache.refresh().await;

			#[cfg(feature = "metrics")]
			metrics::record_auto_disabled(webhook_id);

			tracing::warn!(webhook_id, "webhook auto-disabled after consecutive failures");
		},
		Err(err) => {
			tracing::error!(webhook_id, error = %err, "auto-disable failed");
		},
	}
}
