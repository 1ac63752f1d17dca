//! Setup configuration
//!
//! Rule sources arrive as a JSON-shaped mapping of feature key to
//! `{type: "hosts", hosts: [...]}` or `{type: "dat", file_path: "..."}`.
//! Any other type parses but is rejected by `ContentBlocker::setup`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::types::FeatureKey;
use crate::whitelist::Whitelist;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Kind-specific payload of a rule source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSourceKind {
    /// Static set of blocked hostnames
    Hosts(HashSet<String>),
    /// Path to a compiled rule file
    CompiledMatcher(PathBuf),
    /// Any other declared type, kept so setup can reject it
    Unsupported(String),
}

impl RuleSourceKind {
    pub fn type_name(&self) -> &str {
        match self {
            Self::Hosts(_) => "hosts",
            Self::CompiledMatcher(_) => "dat",
            Self::Unsupported(name) => name,
        }
    }
}

/// One configured engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawRuleSource")]
pub struct RuleSource {
    pub kind: RuleSourceKind,
}

impl RuleSource {
    pub fn hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: RuleSourceKind::Hosts(hosts.into_iter().map(Into::into).collect()),
        }
    }

    pub fn compiled(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: RuleSourceKind::CompiledMatcher(path.into()),
        }
    }

    pub fn unsupported(kind: impl Into<String>) -> Self {
        Self {
            kind: RuleSourceKind::Unsupported(kind.into()),
        }
    }
}

#[derive(Deserialize)]
struct RawRuleSource {
    #[serde(rename = "type")]
    kind: String,
    hosts: Option<HashSet<String>>,
    file_path: Option<PathBuf>,
}

impl TryFrom<RawRuleSource> for RuleSource {
    type Error = String;

    fn try_from(raw: RawRuleSource) -> Result<Self, Self::Error> {
        let kind = match raw.kind.as_str() {
            "hosts" => RuleSourceKind::Hosts(raw.hosts.ok_or("rule source of type 'hosts' needs a 'hosts' list")?),
            "dat" => RuleSourceKind::CompiledMatcher(
                raw.file_path.ok_or("rule source of type 'dat' needs a 'file_path'")?,
            ),
            _ => RuleSourceKind::Unsupported(raw.kind),
        };
        Ok(Self { kind })
    }
}

/// Feature key → rule source, in configuration order.
pub type RuleSources = IndexMap<FeatureKey, RuleSource>;

/// A complete setup payload as read from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockerConfig {
    pub rules: RuleSources,
    #[serde(default)]
    pub whitelist: Whitelist,
}

impl BlockerConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}
