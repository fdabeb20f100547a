//! Executable units: identities for traceable function-like regions

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// Where a unit descriptor came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOrigin {
    /// Found in the static unit registry
    Registered,
    /// Built from a live frame
    Synthesized,
    /// Shared placeholder for code that could not be synthesized
    Unknown,
}

#[derive(Debug)]
struct UnitInfo {
    name: String,
    module_path: String,
    file: String,
    start_line: u32,
    origin: UnitOrigin,
}

/// A traceable unit of code
///
/// Units compare, hash and order by `(name, start_line)`, the key under which
/// a resolver interns them. Clones share one descriptor; use
/// [`same_instance`](Self::same_instance) to test referential identity.
#[derive(Clone)]
pub struct ExecutableUnit(Arc<UnitInfo>);

const UNKNOWN_NAME: &str = "<unknown>";

static UNKNOWN: OnceLock<ExecutableUnit> = OnceLock::new();

impl ExecutableUnit {
    pub fn new(
        name: impl Into<String>,
        module_path: impl Into<String>,
        file: impl Into<String>,
        start_line: u32,
        origin: UnitOrigin,
    ) -> Self {
        Self(Arc::new(UnitInfo {
            name: name.into(),
            module_path: module_path.into(),
            file: file.into(),
            start_line,
            origin,
        }))
    }

    /// A unit known only by name, as rebuilt from a saved report
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, "", "", 0, UnitOrigin::Synthesized)
    }

    /// The shared placeholder unit
    pub fn unknown() -> Self {
        UNKNOWN
            .get_or_init(|| Self::new(UNKNOWN_NAME, "", "", 0, UnitOrigin::Unknown))
            .clone()
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn module_path(&self) -> &str {
        &self.0.module_path
    }

    pub fn file(&self) -> &str {
        &self.0.file
    }

    pub fn start_line(&self) -> u32 {
        self.0.start_line
    }

    pub fn origin(&self) -> UnitOrigin {
        self.0.origin
    }

    pub fn is_unknown(&self) -> bool {
        self.0.origin == UnitOrigin::Unknown
    }

    /// True if both handles point at the same descriptor
    pub fn same_instance(&self, other: &ExecutableUnit) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn key(&self) -> (&str, u32) {
        (&self.0.name, self.0.start_line)
    }
}

impl PartialEq for ExecutableUnit {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ExecutableUnit {}

impl Hash for ExecutableUnit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for ExecutableUnit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExecutableUnit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Debug for ExecutableUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableUnit")
            .field("name", &self.0.name)
            .field("module_path", &self.0.module_path)
            .field("start_line", &self.0.start_line)
            .field("origin", &self.0.origin)
            .finish()
    }
}

impl fmt::Display for ExecutableUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}
