//! Pure dispatch kernel
//!
//! Deterministic. No async. No IO.

pub mod decision;
pub mod engine;
pub mod error;
pub mod input;
pub mod state;

pub use decision::*;
pub use engine::*;
pub use error::*;
pub use input::*;
pub use state::*;
