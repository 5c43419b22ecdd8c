//! Metrics helpers and dispatch telemetry bookkeeping.

// std
#[cfg(feature = "prometheus")]
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
// self
use crate::_prelude::*;

const METRIC_ENQUEUED_TOTAL: &str = "webhook_dispatch_enqueued_total";
const METRIC_SUCCESS_TOTAL: &str = "webhook_dispatch_success_total";
const METRIC_RETRY_TOTAL: &str = "webhook_dispatch_retry_total";
const METRIC_FAILURE_TOTAL: &str = "webhook_dispatch_failure_total";
const METRIC_QUEUE_DROPPED_TOTAL: &str = "webhook_dispatch_queue_dropped_total";
const METRIC_AUTO_DISABLED_TOTAL: &str = "webhook_auto_disabled_total";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thread-safe accumulator for a single dispatcher instance's telemetry.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
	enqueued: AtomicU64,
	successes: AtomicU64,
	retries: AtomicU64,
	failures: AtomicU64,
	queue_dropped: AtomicU64,
	auto_disabled: AtomicU64,
}
impl DispatchMetrics {
	/// Create a new metrics accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record a task enqueued for delivery.
	pub fn record_enqueued(&self) {
		self.enqueued.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a successful delivery.
	pub fn record_success(&self) {
		self.successes.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a retry scheduled after a failed attempt.
	pub fn record_retry(&self) {
		self.retries.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a terminal failed delivery.
	pub fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a task dropped because the queue was full.
	pub fn record_queue_dropped(&self) {
		self.queue_dropped.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a webhook transitioning to `DISABLED` via the auto-disable policy.
	pub fn record_auto_disabled(&self) {
		self.auto_disabled.fetch_add(1, Ordering::Relaxed);
	}

	/// Take a point-in-time snapshot for status reporting.
	pub fn snapshot(&self) -> DispatchMetricsSnapshot {
		DispatchMetricsSnapshot {
			enqueued: self.enqueued.load(Ordering::Relaxed),
			successes: self.successes.load(Ordering::Relaxed),
			retries: self.retries.load(Ordering::Relaxed),
			failures: self.failures.load(Ordering::Relaxed),
			queue_dropped: self.queue_dropped.load(Ordering::Relaxed),
			auto_disabled: self.auto_disabled.load(Ordering::Relaxed),
		}
	}
}

/// Read-only snapshot of dispatcher-wide telemetry counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct DispatchMetricsSnapshot {
	/// Total tasks enqueued.
	pub enqueued: u64,
	/// Total successful deliveries.
	pub successes: u64,
	/// Total retries scheduled.
	pub retries: u64,
	/// Total terminal failures.
	pub failures: u64,
	/// Total tasks dropped for a full queue.
	pub queue_dropped: u64,
	/// Total webhooks auto-disabled.
	pub auto_disabled: u64,
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Record a task enqueued for `webhook_id`.
pub fn record_enqueued(webhook_id: &str) {
	metrics::counter!(METRIC_ENQUEUED_TOTAL, webhook_label(webhook_id).iter()).increment(1);
}

/// Record a successful delivery to `webhook_id`.
pub fn record_success(webhook_id: &str) {
	metrics::counter!(METRIC_SUCCESS_TOTAL, webhook_label(webhook_id).iter()).increment(1);
}

/// Record a retry scheduled for `webhook_id`.
pub fn record_retry(webhook_id: &str) {
	metrics::counter!(METRIC_RETRY_TOTAL, webhook_label(webhook_id).iter()).increment(1);
}

/// Record a terminal failure for `webhook_id`.
pub fn record_failure(webhook_id: &str) {
	metrics::counter!(METRIC_FAILURE_TOTAL, webhook_label(webhook_id).iter()).increment(1);
}

/// Record a task dropped for `webhook_id` because the queue was full.
pub fn record_queue_dropped(webhook_id: &str) {
	metrics::counter!(METRIC_QUEUE_DROPPED_TOTAL, webhook_label(webhook_id).iter()).increment(1);
}

/// Record `webhook_id` transitioning to `DISABLED`.
pub fn record_auto_disabled(webhook_id: &str) {
	metrics::counter!(METRIC_AUTO_DISABLED_TOTAL, webhook_label(webhook_id).iter()).increment(1);
}

fn webhook_label(webhook_id: &str) -> [Label; 1] {
	[Label::new("webhook_id", webhook_id.to_owned())]
}

#[cfg(test)]
mod tests {
	// std
	use std::borrow::Borrow;
	// crates.io
	use metrics_util::{
		CompositeKey, MetricKind,
		debugging::{DebugValue, DebuggingRecorder},
	};
	// self
	use super::*;

	fn capture_metrics<F>(f: F) -> Vec<(CompositeKey, DebugValue)>
	where
		F: FnOnce(),
	{
		let recorder = DebuggingRecorder::new();
		let snapshotter = recorder.snapshotter();

		metrics::with_local_recorder(&recorder, f);

		snapshotter.snapshot().into_vec().into_iter().map(|(key, _, _, value)| (key, value)).collect()
	}

	fn counter_value(snapshot: &[(CompositeKey, DebugValue)], name: &str, webhook_id: &str) -> u64 {
		snapshot
			.iter()
			.find_map(|(key, value)| {
				(key.kind() == MetricKind::Counter
					&& Borrow::<str>::borrow(key.key().name()) == name
					&& key.key().labels().any(|label| label.key() == "webhook_id" && label.value() == webhook_id))
				.then_some(match value {
					DebugValue::Counter(value) => *value,
					_ => 0,
				})
			})
			.unwrap_or(0)
	}

	#[test]
	fn records_dispatch_lifecycle_counters() {
		let snapshot = capture_metrics(|| {
			record_enqueued("wh-1");
			record_success("wh-1");
			record_retry("wh-1");
			record_failure("wh-1");
			record_queue_dropped("wh-1");
			record_auto_disabled("wh-1");
		});

		assert_eq!(counter_value(&snapshot, "webhook_dispatch_enqueued_total", "wh-1"), 1);
		assert_eq!(counter_value(&snapshot, "webhook_dispatch_success_total", "wh-1"), 1);
		assert_eq!(counter_value(&snapshot, "webhook_dispatch_retry_total", "wh-1"), 1);
		assert_eq!(counter_value(&snapshot, "webhook_dispatch_failure_total", "wh-1"), 1);
		assert_eq!(counter_value(&snapshot, "webhook_dispatch_queue_dropped_total", "wh-1"), 1);
		assert_eq!(counter_value(&snapshot, "webhook_auto_disabled_total", "wh-1"), 1);
	}

	#[test]
	fn dispatch_metrics_snapshot_reflects_recorded_events() {
		let metrics = DispatchMetrics::new();

		metrics.record_enqueued();
		metrics.record_success();
		metrics.record_retry();
		metrics.record_failure();
		metrics.record_queue_dropped();
		metrics.record_auto_disabled();

		let snapshot = metrics.snapshot();

		assert_eq!(snapshot.enqueued, 1);
		assert_eq!(snapshot.successes, 1);
		assert_eq!(snapshot.retries, 1);
		assert_eq!(snapshot.failures, 1);
		assert_eq!(snapshot.queue_dropped, 1);
		assert_eq!(snapshot.auto_disabled, 1);
	}
}
