//! Resolution of live frames to executable units
//!
//! A frame's unit is looked up by name in the static registry, scope by scope
//! from the frame outward: first units declared in the enclosing frame's own
//! module, then units declared in one of its ancestor modules. The nearest
//! enclosing frame with a match wins. Without a registration the unit is
//! synthesized from the frame itself; anonymous code (closures, generated
//! code) cannot be synthesized and maps to the shared unknown unit.
//!
//! Every unit handed out is interned, so resolving the same code twice yields
//! the identical [`ExecutableUnit`] for the lifetime of the resolver.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::frame::Frame;
use crate::registry::{self, UnitRegistration};
use crate::unit::{ExecutableUnit, UnitOrigin};

#[derive(Debug, Default)]
pub struct LocationResolver {
    synthesized: HashMap<(String, u32), ExecutableUnit>,
    registered: HashMap<(&'static str, &'static str, u32), ExecutableUnit>,
    unresolvable: HashSet<String>,
}

impl LocationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identify the unit `frame` executes
    pub fn resolve_unit(&mut self, frame: &Frame) -> ExecutableUnit {
        match search_registry(frame.name(), frame) {
            Some(registration) => self.intern_registered(registration),
            None => self.synthesize(frame),
        }
    }

    /// Build a unit directly from `frame`, memoized by name and starting line
    pub fn synthesize(&mut self, frame: &Frame) -> ExecutableUnit {
        let key = (frame.name().to_string(), frame.start_line());
        if let Some(unit) = self.synthesized.get(&key) {
            return unit.clone();
        }

        let unit = if is_anonymous(frame.name()) {
            if self.unresolvable.insert(frame.name().to_string()) {
                warn!(
                    "Couldn't create unit for {} at {}:{}",
                    frame.name(),
                    frame.file(),
                    frame.start_line()
                );
            }
            ExecutableUnit::unknown()
        } else {
            debug!(
                "Synthesized unit {} from {}:{}",
                frame.name(),
                frame.file(),
                frame.start_line()
            );
            ExecutableUnit::new(
                frame.name(),
                frame.module_path(),
                frame.file(),
                frame.start_line(),
                UnitOrigin::Synthesized,
            )
        };

        self.synthesized.insert(key, unit.clone());
        unit
    }

    /// Number of units interned so far
    pub fn len(&self) -> usize {
        self.synthesized.len() + self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn intern_registered(&mut self, registration: &'static UnitRegistration) -> ExecutableUnit {
        let key = (registration.name, registration.module_path, registration.line);
        self.registered
            .entry(key)
            .or_insert_with(|| {
                ExecutableUnit::new(
                    registration.name,
                    registration.module_path,
                    registration.file,
                    registration.line,
                    UnitOrigin::Registered,
                )
            })
            .clone()
    }
}

/// Find the registration of `name` visible from the nearest enclosing frame
fn search_registry(name: &str, frame: &Frame) -> Option<&'static UnitRegistration> {
    for scope in frame.walk().filter(|f| !f.is_internal()) {
        let module_path = scope.module_path();
        if let Some(local) = registry::find_units(name).find(|r| r.declared_in(module_path)) {
            return Some(local);
        }
        if let Some(global) = registry::find_units(name).find(|r| r.visible_from(module_path)) {
            return Some(global);
        }
    }
    None
}

fn is_anonymous(name: &str) -> bool {
    name.is_empty()
        || (name.starts_with("{{") && name.ends_with("}}"))
        || (name.starts_with('<') && name.ends_with('>'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{enter, CallSite};

    fn declared_unit() {}
    crate::register_unit!(declared_unit);

    mod nested {
        pub fn shadowed() {}
        crate::register_unit!(shadowed);
    }

    fn shadowed() {}
    crate::register_unit!(shadowed);

    #[test]
    fn test_synthesized_units_are_memoized() {
        let mut resolver = LocationResolver::new();
        let guard = enter(CallSite::new("plain_fn", module_path!(), file!(), 10), Vec::new());
        let a = resolver.resolve_unit(guard.frame());
        let b = resolver.resolve_unit(guard.frame());
        assert!(a.same_instance(&b));
        assert_eq!(a.origin(), UnitOrigin::Synthesized);
        assert_eq!(a.start_line(), 10);
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn test_distinct_start_lines_are_distinct_units() {
        let mut resolver = LocationResolver::new();
        let first = enter(CallSite::new("twice", module_path!(), file!(), 1), Vec::new());
        let a = resolver.resolve_unit(first.frame());
        drop(first);
        let second = enter(CallSite::new("twice", module_path!(), file!(), 2), Vec::new());
        let b = resolver.resolve_unit(second.frame());
        assert_ne!(a, b);
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn test_closure_falls_back_to_unknown() {
        let mut resolver = LocationResolver::new();
        let guard = enter(
            CallSite::new("{{closure}}", module_path!(), file!(), 5),
            Vec::new(),
        );
        let unit = resolver.resolve_unit(guard.frame());
        assert!(unit.is_unknown());
        assert!(unit.same_instance(&ExecutableUnit::unknown()));
    }

    #[test]
    fn test_registered_unit_preferred_over_synthesis() {
        declared_unit();
        let mut resolver = LocationResolver::new();
        let guard = enter(
            CallSite::new("declared_unit", module_path!(), file!(), 99),
            Vec::new(),
        );
        let a = resolver.resolve_unit(guard.frame());
        let b = resolver.resolve_unit(guard.frame());
        assert_eq!(a.origin(), UnitOrigin::Registered);
        assert_ne!(a.start_line(), 99);
        assert!(a.same_instance(&b));
    }

    #[test]
    fn test_local_registration_wins_over_ancestor_module() {
        nested::shadowed();
        shadowed();
        let nested_module = format!("{}::nested", module_path!());
        let nested_module: &'static str = Box::leak(nested_module.into_boxed_str());

        let mut resolver = LocationResolver::new();
        let guard = enter(
            CallSite::new("shadowed", nested_module, file!(), 1),
            Vec::new(),
        );
        let unit = resolver.resolve_unit(guard.frame());
        assert_eq!(unit.module_path(), nested_module);

        let outer = enter(CallSite::new("shadowed", module_path!(), file!(), 1), Vec::new());
        let unit = resolver.resolve_unit(outer.frame());
        assert_eq!(unit.module_path(), module_path!());
    }

    #[test]
    fn test_registration_found_through_enclosing_frame() {
        declared_unit();
        let mut resolver = LocationResolver::new();
        let _outer = enter(
            CallSite::new("caller", module_path!(), file!(), 1),
            Vec::new(),
        );
        let inner = enter(
            CallSite::new("declared_unit", "elsewhere::module", file!(), 2),
            Vec::new(),
        );
        let unit = resolver.resolve_unit(inner.frame());
        assert_eq!(unit.origin(), UnitOrigin::Registered);
        assert_eq!(unit.module_path(), module_path!());
    }

    #[test]
    fn test_is_anonymous() {
        assert!(is_anonymous("{{closure}}"));
        assert!(is_anonymous("<lambda>"));
        assert!(is_anonymous(""));
        assert!(!is_anonymous("middle"));
    }
}
