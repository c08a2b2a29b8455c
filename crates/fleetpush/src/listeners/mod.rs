//! Event bus subscribers
//!
//! Everything the operator sees or hears rides on lifecycle events; the
//! engine never calls any of this directly.

pub mod console;
pub mod notify;
pub mod prompt;
