//! Tracing setup for the command-line tools.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary. `DELTAPLAN_LOG` overrides the configured level with any
//! `EnvFilter` directive, e.g. `DELTAPLAN_LOG=deltaplan::optimizer=trace`.

use crate::config::LoggingConfig;
use std::env;

/// Environment variable overriding `logging.level`
pub const LOG_ENV: &str = "DELTAPLAN_LOG";

/// Filter directive in effect: `DELTAPLAN_LOG` if set, else the configured level
pub fn filter_directive(config: &LoggingConfig) -> String {
    env::var(LOG_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| config.level.clone())
}

/// Install a global fmt subscriber writing to stderr.
///
/// Returns false when a subscriber was already installed.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let directive = filter_directive(config);
    let filter = tracing_subscriber::EnvFilter::try_new(&directive)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let base = || {
        tracing_subscriber::fmt()
            .with_env_filter(filter.clone())
            .with_ansi(false)
            .with_target(true)
            .with_writer(std::io::stderr)
    };

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if config.format == "json" {
        Box::new(base().json().finish())
    } else {
        Box::new(base().compact().finish())
    };

    tracing::subscriber::set_global_default(subscriber).is_ok()
}
