// Tracer configuration loaded from TOML
//
// Command-line flags are applied on top of the file by the binary.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collector::CollectorKind;
use crate::error::Result;
use crate::filter::{IgnoreItem, IgnoreSet};

/// Settings shared by every session an engine opens
///
/// # Example TOML
/// ```toml
/// collector = "coverage"
/// log_events = false
///
/// [ignore]
/// functions = ["assert_sorted"]
/// modules = ["app::support"]
/// types = ["Checker"]
/// patterns = ["^app::tests::"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Collector created for each run
    pub collector: CollectorKind,

    /// Log every dispatched event at trace level
    pub log_events: bool,

    /// Code never recorded by any session
    pub ignore: IgnoreConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    pub functions: Vec<String>,
    pub modules: Vec<String>,
    /// Types whose methods are ignored
    pub types: Vec<String>,
    /// Regular expressions over `module::Type::method` or `module::function`
    pub patterns: Vec<String>,
}

impl TracerConfig {
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Build the ignore set described by `[ignore]`
    ///
    /// # Errors
    /// Returns [`TraceError::InvalidPattern`](crate::TraceError::InvalidPattern)
    /// for a pattern that is not a valid regular expression.
    pub fn ignore_set(&self) -> Result<IgnoreSet> {
        let mut set = IgnoreSet::new();
        set.extend(self.ignore.functions.iter().map(IgnoreItem::function));
        set.extend(self.ignore.modules.iter().map(IgnoreItem::module));
        set.extend(self.ignore.types.iter().map(IgnoreItem::type_name));
        for pattern in &self.ignore.patterns {
            set.push(IgnoreItem::pattern(pattern)?);
        }
        Ok(set)
    }
}
