use std::error::Error;
use std::io;

use json_logger::{FormatterOptions, JsonConsoleFormatter, JsonLayer, JsonLogger};
use log::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Emits a few sample lines through both the `log` and `tracing` adapters.
///
/// Usage: `json_logger [OPTIONS.json]`. Without an argument, timestamps are
/// printed in UTC and scopes are included.
fn main() -> Result<(), Box<dyn Error>> {
    let options = match std::env::args().nth(1) {
        Some(path) => FormatterOptions::from_json(&std::fs::read_to_string(path)?)?,
        None => FormatterOptions {
            timestamp_format: Some("[hour]:[minute]:[second]".to_string()),
            use_utc_timestamp: true,
            include_scopes: true,
            ..Default::default()
        },
    };
    let formatter = JsonConsoleFormatter::new(options)?;

    JsonLogger::new(formatter.clone(), io::stdout())?
        .with_max_level(LevelFilter::Info)
        .init()?;

    // The registry alone; `try_init` would also claim the `log` facade.
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(JsonLayer::new(formatter.clone()).with_writer(io::stdout));
    tracing::subscriber::set_global_default(subscriber)?;

    log::info!(target: "demo", event_id = 1, user = "ada"; "user signed in");
    log::warn!(target: "demo", retries = 3u64, error = "timeout"; "upstream slow");

    let request = tracing::info_span!("request", id = 42u64);
    let _entered = request.enter();
    tracing::info!(target: "demo", items = 3, total = 12.5, "order placed");
    tracing::info_span!("checkout").in_scope(|| {
        tracing::error!(target: "demo", event_id = 7, error = "card declined", "payment failed");
    });

    formatter.reload(FormatterOptions::default())?;
    tracing::info!(target: "demo", "options reloaded");

    Ok(())
}
