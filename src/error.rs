//! Crate-wide error types and `Result` alias.

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the webhook dispatch crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),

	#[cfg(feature = "metrics")]
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Store error: {0}")]
	Store(String),
	#[error("No dispatcher registered for the given store.")]
	NotRegistered,
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}

#[cfg(feature = "metrics")]
impl<T> From<metrics::SetRecorderError<T>> for Error
where
	T: std::fmt::Display,
{
	fn from(value: metrics::SetRecorderError<T>) -> Self {
		Self::Metrics(value.to_string())
	}
}
