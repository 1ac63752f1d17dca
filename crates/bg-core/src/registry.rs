//! Engine registry and request decisions
//!
//! [`ContentBlocker`] owns the ordered engine table and the whitelist. It is
//! an ordinary value: the embedding layer constructs one and shares it (for
//! example behind an `Arc`) with the threads that handle requests.
//!
//! # Decision order
//!
//! Engines are visited in configuration order. For each engine, a whitelisted
//! feature ends the evaluation with `Allow`; otherwise a `Block` verdict ends it
//! with `Block`. `Allow` and `EngineNotReady` move on to the next engine.
//! Whitelisting the first engine therefore whitelists the whole request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};

use crate::config::{RuleSourceKind, RuleSources};
use crate::engine::{CompiledEngine, Engine, HostSetEngine, LoadTask};
use crate::types::{BlockDecision, BlockRequest, ContentType, FeatureKey};
use crate::whitelist::{is_whitelisted, Whitelist, WhitelistStore};

/// Error type for `ContentBlocker::setup`.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Rule type '{kind}' of feature '{feature}' is not supported")]
    UnsupportedRuleType { feature: FeatureKey, kind: String },
}

/// Snapshot of one registered engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub feature: FeatureKey,
    /// Rule source type the engine was built from
    pub kind: &'static str,
    pub ready: bool,
}

/// Ordered engine table shared with loader threads.
#[derive(Debug, Default)]
struct EngineTable {
    engines: RwLock<IndexMap<FeatureKey, Engine>>,
    /// Latest registration ticket per feature key
    tickets: Mutex<HashMap<FeatureKey, u64>>,
    next_ticket: AtomicU64,
}

impl EngineTable {
    fn issue_ticket(&self, key: &str) -> u64 {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.tickets.lock().insert(key.to_string(), ticket);
        ticket
    }

    /// Insert or overwrite in place. Overwriting keeps the key's position.
    fn insert(&self, key: &str, engine: Engine) {
        self.engines.write().insert(key.to_string(), engine);
    }

    /// Insert only if no newer registration for `key` happened since `ticket` was issued.
    fn insert_if_current(&self, key: &str, ticket: u64, engine: Engine) -> bool {
        let tickets = self.tickets.lock();
        if tickets.get(key) != Some(&ticket) {
            return false;
        }
        self.insert(key, engine);
        true
    }
}

/// Decides whether requests should be blocked.
#[derive(Debug, Default)]
pub struct ContentBlocker {
    table: Arc<EngineTable>,
    whitelist: WhitelistStore,
    ready: AtomicBool,
}

impl ContentBlocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a `setup` call has dispatched all of its rule sources.
    /// Compiled engines may still be loading.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Replace the whitelist and register one engine per rule source.
    ///
    /// Host sets are registered before this returns. Compiled rule files are
    /// loaded in the background and registered only if loading succeeds; the
    /// returned tasks can be waited on. An unsupported rule type aborts the
    /// remaining sources; sources before it stay registered.
    pub fn setup(&self, rules: &RuleSources, whitelist: Option<Whitelist>) -> Result<Vec<LoadTask>, SetupError> {
        self.update_whitelist(whitelist);

        let mut tasks = Vec::new();
        for (key, source) in rules {
            match &source.kind {
                RuleSourceKind::Hosts(hosts) => {
                    self.table.issue_ticket(key);
                    let engine = HostSetEngine::new(hosts);
                    debug!("[{}] Registered host set with {} hosts", key, engine.len());
                    self.table.insert(key, engine.into());
                }
                RuleSourceKind::CompiledMatcher(path) => {
                    let ticket = self.table.issue_ticket(key);
                    let table = Arc::clone(&self.table);
                    let feature = key.clone();
                    let task = CompiledEngine::spawn(key.clone(), path.clone(), move |outcome| match outcome {
                        Ok(engine) => {
                            if table.insert_if_current(&feature, ticket, engine.clone().into()) {
                                debug!("[{}] Registered compiled engine", feature);
                            } else {
                                debug!("[{}] Dropped compiled engine superseded by a newer setup", feature);
                            }
                        }
                        Err(err) => warn!("[{}] Compiled engine not registered: {}", feature, err),
                    });
                    tasks.push(task);
                }
                RuleSourceKind::Unsupported(_) => {
                    return Err(SetupError::UnsupportedRuleType {
                        feature: key.clone(),
                        kind: source.kind.type_name().to_string(),
                    });
                }
            }
        }

        self.ready.store(true, Ordering::Release);
        Ok(tasks)
    }

    /// Replace the whole whitelist. `None` is a no-op.
    pub fn update_whitelist(&self, whitelist: Option<Whitelist>) {
        if self.whitelist.replace(whitelist) {
            debug!("Whitelist replaced");
        }
    }

    /// Decide whether `request_url`, loaded by the page at `site_url`, is blocked.
    pub fn should_block(&self, site_url: Option<&str>, request_url: &str, content_type: ContentType) -> BlockDecision {
        self.decide(&BlockRequest::new(site_url, request_url, content_type))
    }

    pub fn decide(&self, req: &BlockRequest<'_>) -> BlockDecision {
        let host = req.site_host();
        let whitelist = self.whitelist.load();
        let site = whitelist.site(host);
        let generic = whitelist.generic();

        let engines = self.table.engines.read();
        for (key, engine) in engines.iter() {
            if is_whitelisted(key, site, generic) {
                trace!("[{}] Whitelisted on '{}': allow {}", key, host, req.request_url);
                return BlockDecision::Allow;
            }
            match engine.decide(req) {
                BlockDecision::Block => {
                    trace!("[{}] Block {}", key, req.request_url);
                    return BlockDecision::Block;
                }
                BlockDecision::Allow | BlockDecision::EngineNotReady => {}
            }
        }

        BlockDecision::Allow
    }

    /// Kind and readiness of every registered engine, in evaluation order.
    pub fn engine_statuses(&self) -> Vec<EngineStatus> {
        self.table
            .engines
            .read()
            .iter()
            .map(|(feature, engine)| EngineStatus {
                feature: feature.clone(),
                kind: engine.kind(),
                ready: engine.is_ready(),
            })
            .collect()
    }

    pub fn engine_count(&self) -> usize {
        self.table.engines.read().len()
    }

    /// The current whitelist snapshot.
    pub fn whitelist(&self) -> Arc<Whitelist> {
        self.whitelist.load()
    }

    #[cfg(test)]
    fn feature_keys(&self) -> Vec<FeatureKey> {
        self.table.engines.read().keys().cloned().collect()
    }

    #[cfg(test)]
    fn register(&self, key: &str, engine: Engine) {
        self.table.issue_ticket(key);
        self.table.insert(key, engine);
    }
}
