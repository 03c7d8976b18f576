//! # qabot-error
//!
//! Unified error handling for qabot.
//!
//! - **ErrorKind**: what went wrong (e.g. `ParseFailed`, `RateLimited`)
//! - **ErrorStatus**: how to react to it (`Permanent`, `Temporary`, `Persistent`)
//! - **Context**: key-value pairs and the failing operation, for locating the cause
//! - **Source**: the wrapped underlying error, never leaked as a raw type
//!
//! ## Usage
//!
//! ```rust
//! use qabot_error::{Error, ErrorKind};
//!
//! fn parse(text: &str) -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::ParseFailed, "no action phrase found")
//!         .with_operation("requirement::parse")
//!         .with_context("input", text))
//! }
//! ```
//!
//! ## Principles
//!
//! - Fallible functions return `qabot_error::Result<T>`
//! - External errors are wrapped with `set_source(err)`
//! - An error is handled once; callers further up only append context

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using the qabot Error
pub type Result<T> = std::result::Result<T, Error>;
