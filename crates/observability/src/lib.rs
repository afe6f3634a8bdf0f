//! Process-wide logging setup shared by the binaries.

pub mod logging;

pub use logging::{LogConfig, LogFormat, LOG_FORMAT_VAR};

/// Initialize logging from the environment.
///
/// Safe to call multiple times; only the first call installs a subscriber.
pub fn init() {
    logging::init(&LogConfig::from_env());
}
