use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Installs the tracing subscriber once per process.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` (or `regionc=info`)
/// is used.
pub fn init_logging(default_filter: Option<&str>) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter.unwrap_or("regionc=info")));

        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    });
}
