//! Compiled Rule Set ("CRS1")
//!
//! Binary format, writer, loader and matcher for the rule files consumed by
//! the compiled-matcher engine.

mod builder;
mod format;
mod loader;
mod matcher;

pub use builder::*;
pub use format::*;
pub use loader::*;
pub use matcher::*;
