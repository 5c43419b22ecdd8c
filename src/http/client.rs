//! HTTP client integration for webhook delivery.

// crates.io
use reqwest::Client;
// self
use crate::{
	_prelude::*,
	dispatch::{DispatchErrorKind, DispatchResult, DispatchTask, USER_AGENT},
	model::Webhook,
	signer,
};

/// Tunables consumed by [`send_webhook`]; owned by the dispatcher and shared across workers.
#[derive(Clone, Debug)]
pub struct SenderOptions {
	/// Case-folded URL schemes permitted for outbound delivery.
	pub allowed_schemes: Arc<[String]>,
	/// Maximum accepted envelope size, in bytes.
	pub max_payload_size: usize,
	/// Per-attempt timeout covering the whole request.
	pub timeout: Duration,
	/// Bytes of response body retained for diagnostics.
	pub response_body_capture: usize,
}

/// Perform exactly one POST attempt for `task` and return a structured result.
///
/// Scheme and payload-size checks run before any socket is opened; neither counts
/// toward the per-attempt timeout.
pub async fn send_webhook(
	client: &Client,
	task: &DispatchTask,
	options: &SenderOptions,
) -> DispatchResult {
	let webhook = &task.webhook;
	let delivery_id = task.delivery_id().to_string();

	if let Err(kind) = check_scheme(webhook, &options.allowed_schemes) {
		return DispatchResult::failure(&webhook.id, delivery_id, task.retry_count, kind, None, None);
	}

	let body = match serde_json::to_vec(&task.envelope) {
		Ok(body) => body,
		Err(err) => {
			tracing::error!(webhook_id = %webhook.id, error = %err, "failed to serialize envelope");

			return DispatchResult::failure(
				&webhook.id,
				delivery_id,
				task.retry_count,
				DispatchErrorKind::Unexpected,
				None,
				None,
			);
		},
	};

	if body.len() > options.max_payload_size {
		tracing::warn!(
			webhook_id = %webhook.id,
			size = body.len(),
			limit = options.max_payload_size,
			"payload exceeds max_payload_size"
		);

		return DispatchResult::failure(
			&webhook.id,
			delivery_id,
			task.retry_count,
			DispatchErrorKind::PayloadTooLarge,
			None,
			None,
		);
	}

	let mut request = client
		.post(&webhook.url)
		.timeout(options.timeout)
		.header(reqwest::header::CONTENT_TYPE, "application/json")
		.header(reqwest::header::USER_AGENT, USER_AGENT)
		.header("X-MLflow-Event", &task.event_type)
		.header("X-MLflow-Delivery", &delivery_id);

	if let Some(secret) = &webhook.secret {
		let signature = signer::sign(&body, secret.as_bytes());

		request = request.header("X-MLflow-Signature", format!("sha256={signature}"));
	}

	let start = Instant::now();
	let response = request.body(body).send().await;
	let elapsed_ms = start.elapsed().as_millis() as u64;

	match response {
		Ok(response) => {
			let status = response.status();

			if status.is_success() {
				let body = response.text().await.unwrap_or_default();
				let truncated: String =
					body.chars().take(options.response_body_capture).collect();

				DispatchResult::success(
					&webhook.id,
					delivery_id,
					task.retry_count,
					status.as_u16(),
					Some(truncated),
					elapsed_ms,
				)
			} else {
				DispatchResult::failure(
					&webhook.id,
					delivery_id,
					task.retry_count,
					DispatchErrorKind::HttpError(status.as_u16()),
					Some(status.as_u16()),
					Some(elapsed_ms),
				)
			}
		},
		Err(err) => {
			let kind = if err.is_timeout() {
				DispatchErrorKind::Timeout
			} else if err.is_connect() || err.is_request() {
				DispatchErrorKind::Network
			} else {
				DispatchErrorKind::Unexpected
			};

			tracing::debug!(webhook_id = %webhook.id, error = %err, kind = %kind, "delivery attempt failed");

			DispatchResult::failure(
				&webhook.id,
				delivery_id,
				task.retry_count,
				kind,
				None,
				Some(elapsed_ms),
			)
		},
	}
}

fn check_scheme(webhook: &Webhook, allowed_schemes: &[String]) -> std::result::Result<(), DispatchErrorKind> {
	let scheme = webhook.url.split("://").next().unwrap_or_default().to_ascii_lowercase();

	if allowed_schemes.iter().any(|allowed| allowed.eq_ignore_ascii_case(&scheme)) {
		Ok(())
	} else {
		tracing::warn!(webhook_id = %webhook.id, scheme, "disallowed webhook URL scheme");

		Err(DispatchErrorKind::DisallowedScheme)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::WebhookStatus;

	fn webhook(url: &str) -> Webhook {
		Webhook {
			id: "wh-1".into(),
			name: "test".into(),
			description: None,
			url: url.into(),
			events: vec!["MODEL_VERSION_CREATED".into()],
			status: WebhookStatus::Active,
			secret: None,
			created_at: 0,
			updated_at: 0,
		}
	}

	#[test]
	fn scheme_check_is_case_insensitive() {
		let allowed = vec!["https".to_string()];

		assert!(check_scheme(&webhook("HTTPS://example.com/hook"), &allowed).is_ok());
		assert!(check_scheme(&webhook("http://example.com/hook"), &allowed).is_err());
		assert!(check_scheme(&webhook("file:///etc/passwd"), &allowed).is_err());
	}
}
