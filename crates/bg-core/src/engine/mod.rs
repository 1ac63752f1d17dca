//! Filtering engines
//!
//! Engines form a closed set of variants behind one `decide` entry point.
//! Every engine is safe to query from many threads at once and answers
//! without waiting on its own loading.

mod compiled;
mod hosts;

pub use compiled::{CompiledEngine, LoadError, LoadTask};
pub use hosts::HostSetEngine;

use crate::types::{BlockDecision, BlockRequest};

/// A configured filtering engine.
#[derive(Debug)]
pub enum Engine {
    HostSet(HostSetEngine),
    Compiled(CompiledEngine),
}

impl Engine {
    /// Decide whether `req` should be blocked.
    #[inline]
    pub fn decide(&self, req: &BlockRequest<'_>) -> BlockDecision {
        match self {
            Self::HostSet(engine) => engine.decide(req),
            Self::Compiled(engine) => engine.decide(req),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::HostSet(_) => "hosts",
            Self::Compiled(_) => "dat",
        }
    }

    pub fn is_ready(&self) -> bool {
        match self {
            Self::HostSet(_) => true,
            Self::Compiled(engine) => engine.is_ready(),
        }
    }
}

impl From<HostSetEngine> for Engine {
    fn from(engine: HostSetEngine) -> Self {
        Self::HostSet(engine)
    }
}

impl From<CompiledEngine> for Engine {
    fn from(engine: CompiledEngine) -> Self {
        Self::Compiled(engine)
    }
}
