//! Webhook entity and well-known event taxonomy.

// crates.io
use serde::{Deserialize, Serialize};

/// Lifecycle status of a registered webhook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebhookStatus {
	/// Eligible for dispatch.
	Active,
	/// Registered but not currently firing.
	Inactive,
	/// Disabled, typically by the auto-disable policy after repeated failures.
	Disabled,
}

/// Registry event names known to the core, provided as a convenience; `dispatch`
/// accepts any string and does not enforce this list.
pub mod event_type {
	/// A new registered model was created.
	pub const REGISTERED_MODEL_CREATED: &str = "REGISTERED_MODEL_CREATED";
	/// A new model version was created.
	pub const MODEL_VERSION_CREATED: &str = "MODEL_VERSION_CREATED";
	/// A tag was set on a model version.
	pub const MODEL_VERSION_TAG_SET: &str = "MODEL_VERSION_TAG_SET";
	/// A tag was deleted from a model version.
	pub const MODEL_VERSION_TAG_DELETED: &str = "MODEL_VERSION_TAG_DELETED";
	/// An alias was set on a model version.
	pub const MODEL_ALIAS_SET: &str = "MODEL_ALIAS_SET";
	/// An alias was deleted from a model version.
	pub const MODEL_ALIAS_DELETED: &str = "MODEL_ALIAS_DELETED";
}

/// A registered webhook configuration, read-only to the dispatch core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Webhook {
	/// Stable opaque identifier.
	pub id: String,
	/// Human-readable, unique label.
	pub name: String,
	/// Optional human-readable note; opaque to the core.
	#[serde(default)]
	pub description: Option<String>,
	/// Absolute URL the webhook is delivered to.
	pub url: String,
	/// Event-type tags this webhook subscribes to.
	pub events: Vec<String>,
	/// Current lifecycle status.
	pub status: WebhookStatus,
	/// Optional signing secret; when present, outbound payloads are HMAC-signed.
	#[serde(default)]
	pub secret: Option<String>,
	/// Creation timestamp, milliseconds since the Unix epoch.
	pub created_at: i64,
	/// Last-update timestamp, milliseconds since the Unix epoch.
	pub updated_at: i64,
}
impl Webhook {
	/// Whether the webhook is currently active.
	pub fn is_active(&self) -> bool {
		self.status == WebhookStatus::Active
	}

	/// Whether this webhook should fire for the given event type.
	pub fn should_trigger(&self, event_type: &str) -> bool {
		self.is_active() && self.events.iter().any(|e| e == event_type)
	}
}
