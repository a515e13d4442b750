//! Logging setup for the CLI
//!
//! Logs go to stderr so they never interleave with a reply streaming on
//! stdout. `RUST_LOG` takes precedence over the built-in filter.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive used when `RUST_LOG` is unset
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "overlap=debug"
    } else {
        "overlap=info"
    }
}

/// Install the global subscriber
///
/// # Examples
///
/// ```no_run
/// overlap::logging::init_logging(false, true).unwrap();
/// tracing::info!("ready");
/// ```
pub fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(verbose)))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        let layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr);
        registry.with(layer).try_init()?;
    } else {
        let layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr);
        registry.with(layer).try_init()?;
    }

    Ok(())
}
