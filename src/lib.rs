//! copysearch: mirror a remote file server's directory tree into a search
//! index.
//!
//! The [`mirror`] module holds the crawl → flatten → sync pipeline. [`config`]
//! loads process settings for the bundled binary.

pub mod config;
pub mod error;
pub mod mirror;

pub use error::{Error, Result};
