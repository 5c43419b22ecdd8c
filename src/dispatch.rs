//! Dispatch task/result types and the outbound JSON envelope.

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{_prelude::*, model::Webhook};

/// Maximum number of retries after the first failed attempt.
pub const MAX_RETRY_COUNT: u32 = 3;
/// Backoff delay, in seconds, indexed by the task's `retry_count` at failure time.
pub const RETRY_DELAYS: [u64; MAX_RETRY_COUNT as usize] = [1, 2, 4];
/// Maximum payload size accepted for an outbound delivery (1 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;
/// Consecutive terminal failures before a webhook is auto-disabled.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;
/// Per-attempt HTTP timeout.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
/// Bytes of response body retained for diagnostics.
pub const DEFAULT_RESPONSE_BODY_CAPTURE: usize = 1000;
/// Fixed `User-Agent` identifier sent with every delivery.
pub const USER_AGENT: &str = "MLflow-Webhook/1.0";

/// The JSON body sent to a webhook receiver.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookEnvelope {
	/// Tag identifying the domain event that triggered this delivery.
	pub event_type: String,
	/// Milliseconds since the Unix epoch at envelope build time.
	pub timestamp: i64,
	/// Opaque id, stable across all retries of this delivery.
	pub delivery_id: String,
	/// Event-specific payload, opaque to the core.
	pub data: serde_json::Value,
}

/// A unit of work in flight inside the dispatcher.
#[derive(Clone, Debug)]
pub struct DispatchTask {
	/// Snapshot of the webhook at the moment of enqueue.
	pub webhook: Webhook,
	/// Event type tag.
	pub event_type: String,
	/// The envelope to POST.
	pub envelope: WebhookEnvelope,
	/// Number of prior failed attempts; 0 on first enqueue.
	pub retry_count: u32,
	/// Wall time of the original enqueue, preserved across retries.
	pub created_at: DateTime<Utc>,
}
impl DispatchTask {
	/// Build a retry task carrying the same delivery id, payload, and `created_at`.
	pub fn next_attempt(&self) -> DispatchTask {
		DispatchTask {
			webhook: self.webhook.clone(),
			event_type: self.event_type.clone(),
			envelope: self.envelope.clone(),
			retry_count: self.retry_count + 1,
			created_at: self.created_at,
		}
	}

	/// The delivery id carried by this task's envelope.
	pub fn delivery_id(&self) -> &str {
		&self.envelope.delivery_id
	}
}

/// Classification of why a delivery attempt failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchErrorKind {
	/// URL scheme not in the configured allow-list. Terminal.
	DisallowedScheme,
	/// Envelope exceeds the configured size limit. Terminal.
	PayloadTooLarge,
	/// The attempt exceeded its timeout. Retryable.
	Timeout,
	/// Transport/TLS/DNS failure. Retryable.
	Network,
	/// The receiver responded with a status >= 400. Retryable.
	HttpError(u16),
	/// Any other failure inside the sender. Retryable.
	Unexpected,
	/// Could not enqueue (initial or retry). Terminal for the task.
	QueueFull,
	/// The store refused the auto-disable status update. Not re-queued.
	AutoDisableFailed,
}
impl DispatchErrorKind {
	/// Whether this failure class is ever eligible for retry.
	pub fn is_retryable(self) -> bool {
		!matches!(
			self,
			DispatchErrorKind::DisallowedScheme
				| DispatchErrorKind::PayloadTooLarge
				| DispatchErrorKind::QueueFull
				| DispatchErrorKind::AutoDisableFailed
		)
	}
}
impl std::fmt::Display for DispatchErrorKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			DispatchErrorKind::DisallowedScheme => write!(f, "disallowed scheme"),
			DispatchErrorKind::PayloadTooLarge => write!(f, "payload too large"),
			DispatchErrorKind::Timeout => write!(f, "timeout"),
			DispatchErrorKind::Network => write!(f, "network error"),
			DispatchErrorKind::HttpError(status) => write!(f, "http error {status}"),
			DispatchErrorKind::Unexpected => write!(f, "unexpected error"),
			DispatchErrorKind::QueueFull => write!(f, "queue full"),
			DispatchErrorKind::AutoDisableFailed => write!(f, "auto-disable failed"),
		}
	}
}

/// Outcome of one HTTP delivery attempt.
#[derive(Clone, Debug)]
pub struct DispatchResult {
	/// Identifier of the webhook this attempt targeted.
	pub webhook_id: String,
	/// Delivery id shared across all retries of this delivery.
	pub delivery_id: String,
	/// Retry count of the attempt this result describes.
	pub retry_count: u32,
	/// Whether the attempt succeeded (2xx response).
	pub success: bool,
	/// HTTP status code, when a response was received.
	pub response_status: Option<u16>,
	/// Truncated response body, captured for diagnostics.
	pub response_body: Option<String>,
	/// Round-trip time of the attempt, in milliseconds.
	pub response_time_ms: Option<u64>,
	/// Failure classification, present iff `success` is false.
	pub error: Option<DispatchErrorKind>,
}
impl DispatchResult {
	/// Build a successful result.
	pub fn success(
		webhook_id: impl Into<String>,
		delivery_id: impl Into<String>,
		retry_count: u32,
		status: u16,
		body: Option<String>,
		elapsed_ms: u64,
	) -> Self {
		Self {
			webhook_id: webhook_id.into(),
			delivery_id: delivery_id.into(),
			retry_count,
			success: true,
			response_status: Some(status),
			response_body: body,
			response_time_ms: Some(elapsed_ms),
			error: None,
		}
	}

	/// Build a failed result.
	pub fn failure(
		webhook_id: impl Into<String>,
		delivery_id: impl Into<String>,
		retry_count: u32,
		error: DispatchErrorKind,
		status: Option<u16>,
		elapsed_ms: Option<u64>,
	) -> Self {
		Self {
			webhook_id: webhook_id.into(),
			delivery_id: delivery_id.into(),
			retry_count,
			success: false,
			response_status: status,
			response_body: None,
			response_time_ms: elapsed_ms,
			error: Some(error),
		}
	}
}

/// Build the envelope for one recipient of a `dispatch()` call.
pub fn build_envelope(
	event_type: &str,
	data: serde_json::Value,
	delivery_id: String,
) -> WebhookEnvelope {
	WebhookEnvelope { event_type: event_type.to_string(), timestamp: Utc::now().timestamp_millis(), delivery_id, data }
}

/// Backoff delay for the attempt that just failed at `retry_count`.
pub fn retry_delay(retry_count: u32) -> Option<Duration> {
	RETRY_DELAYS.get(retry_count as usize).map(|secs| Duration::from_secs(*secs))
}
