//! Provide tracing, tailored to this program.
//!
//! The binary calls [`init_stdout`] once at startup to install a tracing
//! subscriber. The library only emits events; it never installs anything.
//!
//! The rest of the crate can include `use crate::logging::prelude::*` for
//! convenient access to the `trace!()`, `debug!()`, `info!()`, `warn!()`, and
//! `error!()` macros.

use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

/// Re-export of the tracing level macros
pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

/// Log to stdout, filtering according to environment variable RUST_LOG.
///
/// Without RUST_LOG the default level is INFO, or DEBUG when `verbose` is set.
pub fn init_stdout(verbose: bool) {
    let default_level = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_timer(LocalTimer),
        )
        .init();
}

// Timestamps in local time, to the nearest second. Passthrough sessions are
// short and read by a human at the bench, the default UTC RFC 3339 stamp is noise.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or(OffsetDateTime::now_utc());
        let stamp = now
            .format(time::macros::format_description!("[hour]:[minute]:[second]"))
            .map_err(|_| std::fmt::Error)?;
        write!(w, "{}", stamp)
    }
}
