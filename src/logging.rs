use std::sync::Once;

static TRACING_INIT: Once = Once::new();

pub const LOG_ENV: &str = "CUENTAS_LOG";
const DEFAULT_FILTER: &str = "cuentas=info";

/// Initializes the global tracing subscriber, writing to stderr.
///
/// The filter comes from `CUENTAS_LOG`, then `configured`, then `cuentas=info`.
/// An unparsable filter falls back to the default.
pub fn init_tracing(configured: Option<&str>) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt};

        let directives = std::env::var(LOG_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| configured.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let filter = EnvFilter::try_new(&directives)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    });
}
