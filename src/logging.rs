//! Logging utilities
//!
//! Sets up `env_logger` with timestamped output. `RUST_LOG` selects the
//! level (default `info`).

use chrono::Local;
use env_logger::{Builder, Env};
use std::io::Write;

/// Initialise the global logger. Later calls are no-ops.
pub fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{:<5}] {}: {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();
}
