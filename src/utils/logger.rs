//! Logging setup
//!
//! Logs go to stderr so that `list --json` output stays machine readable.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global subscriber
///
/// # Arguments
/// * `log_level` - explicit level or filter directive; wins over everything
/// * `fallback` - used when neither `log_level` nor `RUST_LOG` is set
///
/// # Examples
/// ```no_run
/// use mapdl_warden::utils::logger::init_logger;
///
/// // RUST_LOG, or warn
/// init_logger(None, "warn").unwrap();
///
/// // explicit level
/// init_logger(Some("debug"), "warn").unwrap();
/// ```
pub fn init_logger(log_level: Option<&str>, fallback: &str) -> Result<()> {
    let env_filter = build_filter(log_level, fallback)?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::debug!("Logger initialized");
    Ok(())
}

fn build_filter(log_level: Option<&str>, fallback: &str) -> Result<EnvFilter> {
    if let Some(level) = log_level {
        return Ok(EnvFilter::try_new(level)?);
    }
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(fallback)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_level_is_used() {
        let filter = build_filter(Some("debug"), "warn").unwrap();
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn invalid_directive_is_rejected() {
        assert!(build_filter(Some("mapdl_warden=loud"), "warn").is_err());
    }
}
