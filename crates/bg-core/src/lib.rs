//! blockgate Core Library
//!
//! This crate decides, for every outgoing request made while a page renders,
//! whether the request should be blocked.
//!
//! # Architecture
//!
//! A [`ContentBlocker`] owns an ordered table of named filtering engines and a
//! per-site, per-feature whitelist. Engines are either built synchronously
//! (host sets) or loaded in the background from a compiled rule file. Every
//! request walks the engines in configuration order; a whitelisted feature
//! short-circuits to `Allow`, and the first `Block` verdict wins.
//!
//! # Modules
//!
//! - `config`: Rule source and whitelist configuration shapes
//! - `engine`: Host-set engine and the compiled-matcher adapter
//! - `hash`: Host hashing and CRC32
//! - `registry`: The orchestrator (`ContentBlocker`)
//! - `ruleset`: Compiled rule file format, loader and matcher
//! - `types`: Shared type definitions
//! - `url`: Allocation-free host extraction
//! - `whitelist`: Whitelist snapshot and precedence rules

pub mod config;
pub mod engine;
pub mod hash;
pub mod registry;
pub mod ruleset;
pub mod types;
pub mod url;
pub mod whitelist;

// Re-export commonly used types
pub use config::{BlockerConfig, ConfigError, RuleSource, RuleSourceKind, RuleSources};
pub use engine::{CompiledEngine, Engine, HostSetEngine, LoadError, LoadTask};
pub use registry::{ContentBlocker, EngineStatus, SetupError};
pub use ruleset::{RuleMatcher, RuleSet, RuleSetBuilder, RuleSetError};
pub use types::{BlockDecision, BlockRequest, ContentType, FeatureKey};
pub use whitelist::{ActivationState, Whitelist, WhitelistStore, WILDCARD_SITE};
