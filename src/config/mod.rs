//! Configuration parsing and types.
//!
//! - `types` - `conductor.yaml` structure (`Config` and its sections)
//! - `duration` - duration strings ("500ms", "30s", "1m") and their serde adapter
//! - `parser` - config discovery, loading, and deployment group files

mod duration;
mod parser;
mod types;

pub use duration::*;
pub use parser::*;
pub use types::*;
