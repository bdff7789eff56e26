//! Throttled, lazily-opened byte-range file transfer regions.
//!
//! A [`ThrottledFileRegion`] owns a bounded byte range of a file and
//! streams it into any [`tokio::io::AsyncWrite`] destination under a
//! soft bandwidth cap. The file is opened lazily, on the first
//! transfer attempt that needs bytes, and closed exactly once when the
//! last reference to the region is released.
//!
//! # Main Components
//!
//! - `region`: the transfer region itself, its lazy open and its
//!   reference-counted teardown.
//! - `config`: throttling options (rate ceiling, recheck interval).
//! - `errors`: the error taxonomy shared by all region operations.

pub mod config;
pub mod errors;
pub mod region;

pub use config::ThrottleOptions;
pub use errors::{RegionError, Result};
pub use region::ThrottledFileRegion;
