//! Static registry of traceable units
//!
//! Units declared with [`register_unit!`](crate::register_unit) are collected
//! at link time into [`UNIT_REGISTRY`]. The resolver searches it before it
//! falls back to synthesizing a unit from a live frame.

use linkme::distributed_slice;

/// A unit declared ahead of execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitRegistration {
    pub name: &'static str,
    pub module_path: &'static str,
    pub file: &'static str,
    pub line: u32,
}

impl UnitRegistration {
    pub const fn new(
        name: &'static str,
        module_path: &'static str,
        file: &'static str,
        line: u32,
    ) -> Self {
        Self {
            name,
            module_path,
            file,
            line,
        }
    }

    /// True if the unit is declared in `module_path` itself
    pub fn declared_in(&self, module_path: &str) -> bool {
        self.module_path == module_path
    }

    /// True if the unit is declared in `module_path` or one of its ancestors
    pub fn visible_from(&self, module_path: &str) -> bool {
        module_path == self.module_path
            || module_path
                .strip_prefix(self.module_path)
                .is_some_and(|rest| rest.starts_with("::"))
    }
}

/// All units registered with `register_unit!`
#[distributed_slice]
pub static UNIT_REGISTRY: [UnitRegistration];

/// Iterate over all registered units
pub fn iter_units() -> impl Iterator<Item = &'static UnitRegistration> {
    UNIT_REGISTRY.iter()
}

/// All registrations carrying `name`
pub fn find_units(name: &str) -> impl Iterator<Item = &'static UnitRegistration> + '_ {
    UNIT_REGISTRY.iter().filter(move |reg| reg.name == name)
}

pub fn unit_count() -> usize {
    UNIT_REGISTRY.len()
}

/// Declare a traceable unit in the current module
///
/// ```ignore
/// fn checksum(data: &[u8]) -> u32 { /* ... */ }
/// tarantula::register_unit!(checksum);
/// ```
#[macro_export]
macro_rules! register_unit {
    ($name:ident) => {
        const _: () = {
            #[$crate::linkme::distributed_slice($crate::registry::UNIT_REGISTRY)]
            #[linkme(crate = $crate::linkme)]
            static REGISTRATION: $crate::registry::UnitRegistration =
                $crate::registry::UnitRegistration::new(
                    stringify!($name),
                    module_path!(),
                    file!(),
                    line!(),
                );
        };
    };
}
