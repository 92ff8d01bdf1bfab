//! Log output for the server.
//!
//! Events from the server, `snowdrift` and `tower-http` go to stdout through a
//! `tracing_subscriber::fmt` layer. Verbosity follows `RUST_LOG` and defaults
//! to `info`:
//!
//! ```bash
//! RUST_LOG=snowdrift=trace,tower_http=debug cargo run
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true),
        )
        .try_init()?;

    Ok(())
}
