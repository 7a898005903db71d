//! services/engine/src/telemetry.rs
//!
//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! The engine is a library and never installs a subscriber on its own; the
//! hosting application calls `init_tracing` once at startup. `RUST_LOG`
//! controls the filter (e.g. "debug" or directives like
//! "info,engine_lib=debug"), `LOG_FORMAT=json` selects structured output.

use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,engine_lib=debug"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => {
            builder.json().init();
        }
        _ => {
            builder.init();
        }
    }
}
