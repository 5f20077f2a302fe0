//! ## Features
//!
//! - Standard logging levels (info, warn, error, verbose, debug, success)
//! - Multi-line message support: every line becomes its own event
//! - All events go through `tracing` under the `chorus` target, so binaries
//!   choose formatting and filtering with a single subscriber
//!
//! ## Usage
//!
//! Call sites use the macros with a preformatted message:
//!
//! ```
//! bentley::info!(&format!("Indexed {} vectors", 3));
//! bentley::success!("Rebuild finished");
//! ```
//!
//! Binaries call [`init_subscriber`] once at startup.

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Filter used when neither `RUST_LOG` nor `--verbose` is set
const DEFAULT_FILTER: &str = "chorus=info,sqlx=warn,warn";

/// Filter used in verbose mode
const VERBOSE_FILTER: &str = "chorus=debug,sqlx=info,info";

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the built-in filters. Calling this more than once is
/// harmless; later calls leave the first subscriber in place.
pub fn init_subscriber(verbose: bool) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    EnvFilter::new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER })
  });

  let _ = tracing_subscriber::registry()
    .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
    .with(filter)
    .try_init();
}

/// Verbose logging - chatty progress detail
pub fn verbose(message: &str) {
  for line in message.lines() {
    tracing::debug!(target: "chorus", "{line}");
  }
}

/// Info level logging - general information
pub fn info(message: &str) {
  for line in message.lines() {
    tracing::info!(target: "chorus", "{line}");
  }
}

/// Warning level logging - something needs attention
pub fn warn(message: &str) {
  for line in message.lines() {
    tracing::warn!(target: "chorus", "{line}");
  }
}

/// Error level logging - something went wrong
pub fn error(message: &str) {
  for line in message.lines() {
    tracing::error!(target: "chorus", "{line}");
  }
}

/// Debug level logging - detailed diagnostic information
pub fn debug(message: &str) {
  for line in message.lines() {
    tracing::trace!(target: "chorus", "{line}");
  }
}

/// Success level logging - something completed successfully
pub fn success(message: &str) {
  for line in message.lines() {
    tracing::info!(target: "chorus", outcome = "success", "{line}");
  }
}

/// Macros for coverage-excluded logging - these expand with LCOV_EXCL_LINE at call sites
#[macro_export]
macro_rules! info {
  ($msg:expr) => {
    $crate::info($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! warn {
  ($msg:expr) => {
    $crate::warn($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! error {
  ($msg:expr) => {
    $crate::error($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! verbose {
  ($msg:expr) => {
    $crate::verbose($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! debug {
  ($msg:expr) => {
    $crate::debug($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! success {
  ($msg:expr) => {
    $crate::success($msg); // LCOV_EXCL_LINE
  };
}
