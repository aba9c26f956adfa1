//! Logging configuration for the indexer

use crate::config::LoggingConfig;

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set: the configured level, with the database and HTTP
/// client crates kept quiet.
fn default_filter(level: &str) -> String {
	format!("{level},sqlx=warn,reqwest=warn,hyper=warn")
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `[logging] level`.
pub fn init_logging(config: &LoggingConfig) {
	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(default_filter(&config.level)));

	let builder = tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false);

	// A second initialization (tests, embedding) keeps the first subscriber.
	let result = if config.json {
		builder.json().try_init()
	} else {
		builder.try_init()
	};

	if result.is_ok() {
		tracing::debug!(
			"Logging initialized with level {} (json: {})",
			config.level,
			config.json
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_filter_quiets_dependencies() {
		let filter = default_filter("debug");
		assert!(filter.starts_with("debug,"));
		assert!(filter.contains("sqlx=warn"));
		assert!(filter.contains("reqwest=warn"));
		assert!(EnvFilter::try_new(filter).is_ok());
	}
}
