//! rusty-qa/crates/rq-core/src/lib.rs
//!
//! The central domain logic and interface definitions for rusty-qa.

pub mod content;
pub mod error;
pub mod markup;
pub mod models;
pub mod pipeline;
pub mod signals;
pub mod thread;
pub mod traits;

// Re-exporting for easier access in other crates
pub use content::*;
pub use error::*;
pub use models::*;
pub use pipeline::*;
pub use signals::*;
pub use traits::*;
