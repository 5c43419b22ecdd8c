//! Async webhook delivery subsystem for a model-registry service.
//!
//! A [`Dispatcher`] watches a [`WebhookStore`] for active, event-subscribed webhooks
//! through a periodically refreshed [`WebhookCache`], turns domain events into signed
//! outbound HTTP POSTs, and retries or auto-disables recipients according to a fixed
//! failure policy. [`DispatcherRegistry`] keeps at most one running dispatcher per store.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod dispatch;
pub mod dispatcher;
pub mod http;
#[cfg(feature = "metrics")] pub mod metrics;
pub mod model;
pub mod registry;
pub mod signer;
pub mod store;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}
#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	dispatch::{DispatchErrorKind, DispatchResult, DispatchTask, WebhookEnvelope},
	dispatcher::{Dispatcher, DispatcherOptions},
	cache::manager::WebhookCache,
	error::{Error, Result},
	model::{Webhook, WebhookStatus, event_type},
	registry::{DispatcherRegistry, get_dispatcher, shutdown_all_dispatchers, shutdown_dispatcher},
	store::{InMemoryWebhookStore, WebhookStore},
};
