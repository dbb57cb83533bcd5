//! # podnic Common
//!
//! Shared utilities for the podnic binaries.
//!
//! ## Logging
//!
//! ```rust,no_run
//! use podnic_common::{init_logging, LogFormat};
//!
//! init_logging("info", LogFormat::Pretty).unwrap();
//! tracing::info!(bridge = "br-int", "Ready");
//! ```

pub mod logging;

pub use logging::{build_filter, init_logging, LogFormat};
