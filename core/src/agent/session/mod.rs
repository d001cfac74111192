//! Session orchestration
//!
//! Runs the pure dispatch engine against real tools, memory and the
//! language model for one request.

pub mod session;

pub use session::*;
