//! Console logging via `tracing-subscriber`.
//!
//! `RUST_LOG` wins over the configured level. ANSI colours only when stdout is
//! a terminal.

use std::io::IsTerminal;

use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingSection;

/// Installs the global subscriber. Calling it twice keeps the first one.
pub fn init_tracing(config: &LoggingSection) {
    let filter = build_filter(&config.level);
    let use_ansi = std::io::stdout().is_terminal();

    let console_layer = if config.json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(use_ansi)
            .with_filter(filter)
            .boxed()
    };

    if tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("global tracing subscriber already initialized");
    } else {
        tracing::info!(
            level = %config.level,
            json = config.json,
            ansi_colors = use_ansi,
            "console logging initialized"
        );
    }
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
