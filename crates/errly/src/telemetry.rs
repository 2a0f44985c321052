//! Optional log output for applications that have no subscriber of their own

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Log level matching the `debug` configuration flag
pub fn level_for(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "warn"
    }
}

/// Install a global fmt subscriber for the SDK crates.
///
/// `RUST_LOG` takes precedence over `level` when set. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()?
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "errly={level},\
             errly_core={level},\
             errly_client={level},\
             errly_panic={level},\
             errly_axum={level},\
             hyper=warn,\
             reqwest=warn",
            level = level
        ))
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_follows_debug_flag() {
        assert_eq!(level_for(true), "debug");
        assert_eq!(level_for(false), "warn");
    }
}
