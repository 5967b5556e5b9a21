//! This module provides a built-in logger implementation.
//!
//! The built-in logger implementation uses the `env_logger` crate. It is enabled by the Cargo
//! feature "builtin_env_logger" which is enabled by default. When enabled, it is initialized in
//! [`crate::init`] and shows logs of levels INFO or lower (the lower, the more important).
//!
//! This provides a convenient out-of-the-box experience so callers can see collector logs without
//! configuration, and can easily adjust log levels from environment variables. A caller that wants
//! to integrate with its own logging framework can disable the Cargo feature "builtin_env_logger"
//! and register its own implementation with the `log` crate before calling [`crate::init`].

use log::debug;

/// Attempt to init an env_logger for the collector.
/// Does nothing if the "builtin_env_logger" feature is disabled.
pub(crate) fn try_init() {
    cfg_if::cfg_if! {
        if #[cfg(feature = "builtin_env_logger")] {
            let result = env_logger::try_init_from_env(
                // By default, show info level logging.
                env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
            );

            match result {
                Ok(()) => {
                    debug!("cgc initialized the logger.");
                }
                Err(e) => {
                    // Currently `log::SetLoggerError` can only be raised for one reason: the logger has already been initialized.
                    debug!("cgc failed to initialize the built-in env_logger: {e}");
                }
            }
        } else {
            debug!("cgc didn't initialize the built-in env_logger. The Cargo feature \"builtin_env_logger\" is not enabled.");
        }
    }
}
