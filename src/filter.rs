//! Ignore sets for `-e ignore=` expressions
//!
//! Decides which frames a collector never records. Tracer-owned frames are
//! always ignored; callers add functions, modules or regular expressions on
//! top, e.g. assertion helpers that should not show up in the spectrum.
//!
//! Supported items:
//! - Functions: `fn:check` or a bare `check`
//! - Modules (and their submodules): `mod:app::support`
//! - Methods of a type: `type:Checker`
//! - Regular expressions over `module::Type::method` or `module::function`:
//!   `re:^app::tests::`

use regex::Regex;

use crate::error::{Result, TraceError};
use crate::frame::Frame;

/// One thing to exclude from tracing
#[derive(Debug, Clone)]
pub enum IgnoreItem {
    Function(String),
    Module(String),
    /// Methods defined in an `impl` block of the named type
    Type(String),
    Pattern(Regex),
}

impl IgnoreItem {
    pub fn function(name: impl Into<String>) -> Self {
        IgnoreItem::Function(name.into())
    }

    pub fn module(path: impl Into<String>) -> Self {
        IgnoreItem::Module(path.into())
    }

    pub fn type_name(name: impl Into<String>) -> Self {
        IgnoreItem::Type(name.into())
    }

    pub fn pattern(expr: &str) -> Result<Self> {
        Regex::new(expr)
            .map(IgnoreItem::Pattern)
            .map_err(|source| TraceError::InvalidPattern {
                pattern: expr.to_string(),
                source,
            })
    }

    /// Check if `frame` is covered by this item
    pub fn matches(&self, frame: &Frame) -> bool {
        match self {
            IgnoreItem::Function(name) => frame.name() == name,
            IgnoreItem::Module(path) => in_module(frame.module_path(), path),
            IgnoreItem::Type(name) => frame.owner() == Some(name.as_str()),
            IgnoreItem::Pattern(re) => re.is_match(&frame.qualified_name()),
        }
    }
}

fn in_module(module_path: &str, path: &str) -> bool {
    module_path == path
        || module_path
            .strip_prefix(path)
            .is_some_and(|rest| rest.starts_with("::"))
}

/// Frames a collector does not record
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    items: Vec<IgnoreItem>,
}

impl IgnoreSet {
    /// An ignore set that only excludes the tracer's own frames
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = IgnoreItem>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }

    /// Parse an expression like "ignore=fn:check,mod:app::support"
    pub fn from_expr(expr: &str) -> Result<Self> {
        match expr.strip_prefix("ignore=") {
            Some(spec) => Self::from_spec(spec),
            None => Err(TraceError::InvalidExpression(expr.to_string())),
        }
    }

    /// Parse the part after "ignore="
    fn from_spec(spec: &str) -> Result<Self> {
        let mut items = Vec::new();

        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let item = if let Some(name) = part.strip_prefix("fn:") {
                IgnoreItem::function(name)
            } else if let Some(path) = part.strip_prefix("mod:") {
                IgnoreItem::module(path)
            } else if let Some(name) = part.strip_prefix("type:") {
                IgnoreItem::type_name(name)
            } else if let Some(expr) = part.strip_prefix("re:") {
                IgnoreItem::pattern(expr)?
            } else {
                IgnoreItem::function(part)
            };
            items.push(item);
        }

        Ok(Self { items })
    }

    pub fn push(&mut self, item: IgnoreItem) {
        self.items.push(item);
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = IgnoreItem>) {
        self.items.extend(items);
    }

    pub fn items(&self) -> &[IgnoreItem] {
        &self.items
    }

    /// Check if events of `frame` must not be recorded
    pub fn should_ignore(&self, frame: &Frame) -> bool {
        frame.is_internal() || self.items.iter().any(|item| item.matches(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{enter, CallSite};

    fn with_frame<R>(name: &'static str, module: &'static str, f: impl FnOnce(&Frame) -> R) -> R {
        let guard = enter(CallSite::new(name, module, file!(), 1), Vec::new());
        f(guard.frame())
    }

    #[test]
    fn test_empty_set_ignores_nothing_user_defined() {
        let set = IgnoreSet::new();
        assert!(!with_frame("middle", "app", |f| set.should_ignore(f)));
    }

    #[test]
    fn test_function_items() {
        let set = IgnoreSet::from_expr("ignore=fn:check,assert_sorted").unwrap();
        assert!(with_frame("check", "app", |f| set.should_ignore(f)));
        assert!(with_frame("assert_sorted", "app::x", |f| set.should_ignore(f)));
        assert!(!with_frame("middle", "app", |f| set.should_ignore(f)));
    }

    #[test]
    fn test_module_items_include_submodules() {
        let set = IgnoreSet::from_expr("ignore=mod:app::support").unwrap();
        assert!(with_frame("a", "app::support", |f| set.should_ignore(f)));
        assert!(with_frame("b", "app::support::deep", |f| set.should_ignore(f)));
        assert!(!with_frame("c", "app::supporting", |f| set.should_ignore(f)));
        assert!(!with_frame("d", "app", |f| set.should_ignore(f)));
    }

    #[test]
    fn test_pattern_items() {
        let set = IgnoreSet::from_expr("ignore=re:^app::tests::").unwrap();
        assert!(with_frame("helper", "app::tests", |f| set.should_ignore(f)));
        assert!(!with_frame("helper", "app::logic", |f| set.should_ignore(f)));
    }

    #[test]
    fn test_invalid_expression() {
        assert!(matches!(
            IgnoreSet::from_expr("invalid"),
            Err(TraceError::InvalidExpression(_))
        ));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            IgnoreSet::from_expr("ignore=re:("),
            Err(TraceError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_empty_spec() {
        let set = IgnoreSet::from_expr("ignore=").unwrap();
        assert!(set.items().is_empty());
    }

    #[test]
    fn test_extend_and_push() {
        let mut set = IgnoreSet::new();
        set.push(IgnoreItem::function("a"));
        set.extend([IgnoreItem::module("m"), IgnoreItem::function("b")]);
        assert_eq!(set.items().len(), 3);
        assert!(with_frame("z", "m::n", |f| set.should_ignore(f)));
    }

    #[test]
    fn test_internal_frames_always_ignored() {
        let set = IgnoreSet::new();
        let site = CallSite::new("dispatch", "tarantula", file!(), 1);
        let guard = crate::frame::enter_internal(site);
        assert!(set.should_ignore(guard.frame()));
    }

    #[test]
    fn test_type_items_match_methods_only() {
        let set = IgnoreSet::from_expr("ignore=type:Checker").unwrap();
        let site = CallSite::new("verify", "app::helpers", file!(), 1).with_owner(Some("Checker"));
        let method = enter(site, Vec::new());
        assert!(set.should_ignore(method.frame()));
        drop(method);
        assert!(!with_frame("Checker", "app::helpers", |f| set.should_ignore(f)));
        assert!(!with_frame("verify", "app::helpers", |f| set.should_ignore(f)));
    }

    #[test]
    fn test_pattern_sees_owner() {
        let set = IgnoreSet::from_items([IgnoreItem::pattern("Checker").unwrap()]);
        let site = CallSite::new("verify", "app::helpers", file!(), 1).with_owner(Some("Checker"));
        let method = enter(site, Vec::new());
        assert_eq!(method.frame().qualified_name(), "app::helpers::Checker::verify");
        assert!(set.should_ignore(method.frame()));
        drop(method);
        assert!(!with_frame("work", "app", |f| set.should_ignore(f)));
    }
}
