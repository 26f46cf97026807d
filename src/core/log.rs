use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, filter::Targets, fmt, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

/// Crate events are shown from `warn` up, or from `debug` up when verbose.
fn crate_targets(verbose: bool) -> Targets {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    Targets::new().with_target(env!("CARGO_CRATE_NAME"), level)
}

/// Installs the global subscriber. Events go to stderr so report tables on
/// stdout stay clean; `RUST_LOG` narrows the output further.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let installed = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .without_time(),
        )
        .with(crate_targets(verbose))
        .with(env_filter)
        .try_init();
    if installed.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}
