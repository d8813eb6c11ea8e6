//! Log output for the node.
//!
//! Events are filtered through `RUST_LOG` (default `info`) and printed with
//! thread ids, so the executor worker handling each callback is visible.
//! With the `tracing` feature disabled the subscriber is still installed but
//! neither the node nor `rclcore` emit anything.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_line_number(true)
                .with_target(false),
        )
        .try_init()?;
    Ok(())
}
