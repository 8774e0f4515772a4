//! CBP Common Library
//!
//! Shared infrastructure for the customer batch processor workspace.
//!
//! - **Error Handling**: the shared error type plus helpers for walking error chains
//! - **Logging**: centralised `tracing` subscriber setup driven by config or environment
//!
//! # Example
//!
//! ```no_run
//! use cbp_common::logging::{init_logging, LogConfig};
//! use tracing::info;
//!
//! fn main() -> cbp_common::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     info!("Application started");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;

pub use error::{root_cause, root_cause_message, CommonError, Result};
