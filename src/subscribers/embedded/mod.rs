//! # Built-in subscribers
//!
//! - [`LogWriter`]: prints the run trace in a human-readable form.

mod log;

pub use log::LogWriter;
