//! blockgate Filter List Compiler
//!
//! This crate compiles adblock-style filter lists and hosts files into the
//! CRS rule file format loaded by the compiled-matcher engine.

pub mod builder;
pub mod optimizer;
pub mod parser;

pub use builder::{build_rule_set, rule_set_builder};
pub use optimizer::{optimize_rules, OptimizeStats};
pub use parser::{parse_filter_list, CompiledRule, RulePattern};
