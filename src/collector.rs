//! Event collectors
//!
//! A collector receives the events of one traced run. Every collector shares
//! a [`CallRecord`] holding the run's identifying call, its ignore set and its
//! unit resolver; the variants differ only in what they keep per event:
//!
//! - [`CoverageCollector`] records every `(unit, line)` pair reached
//! - [`NullCollector`] records nothing beyond the identifying call
//! - [`RecordedCollector`] holds a frozen run loaded from a report

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TraceError};
use crate::event::{Event, EventKind};
use crate::filter::{IgnoreItem, IgnoreSet};
use crate::frame::Frame;
use crate::resolver::LocationResolver;
use crate::unit::ExecutableUnit;

/// A reached line of a resolved unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub unit: ExecutableUnit,
    pub line: u32,
}

impl Location {
    pub fn new(unit: ExecutableUnit, line: u32) -> Self {
        Self { unit, line }
    }

    pub fn event(&self) -> Event {
        Event::new(self.unit.name(), self.line)
    }
}

/// State every collector keeps about its run
#[derive(Debug, Default)]
pub struct CallRecord {
    resolver: LocationResolver,
    ignore: IgnoreSet,
    function: Option<ExecutableUnit>,
    args: Vec<(String, String)>,
    exception: Option<String>,
}

impl CallRecord {
    pub fn new(ignore: IgnoreSet) -> Self {
        Self {
            ignore,
            ..Self::default()
        }
    }

    /// A record whose identifying call is already known
    pub fn with_call(function: ExecutableUnit, args: Vec<(String, String)>) -> Self {
        Self {
            function: Some(function),
            args,
            ..Self::default()
        }
    }

    pub fn resolver_mut(&mut self) -> &mut LocationResolver {
        &mut self.resolver
    }

    pub fn ignore(&self) -> &IgnoreSet {
        &self.ignore
    }

    pub fn ignore_mut(&mut self) -> &mut IgnoreSet {
        &mut self.ignore
    }

    pub fn has_call(&self) -> bool {
        self.function.is_some()
    }

    /// Remember the first qualifying call of the run
    fn capture_call(&mut self, frame: &Frame) {
        let unit = self.resolver.resolve_unit(frame);
        self.args = frame
            .locals()
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        debug!("Collected first call {}({})", unit, render_args(&self.args));
        self.function = Some(unit);
    }

    pub(crate) fn set_exception(&mut self, description: Option<String>) {
        self.exception = description;
    }
}

fn render_args(args: &[(String, String)]) -> String {
    args.iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Receives trace events of a single run
pub trait EventCollector: fmt::Debug {
    /// Record one event of a frame that is not ignored
    fn collect(&mut self, frame: &Frame, kind: EventKind, value: Option<&str>);

    /// Events seen during the run
    fn events(&self) -> &BTreeSet<Event>;

    /// Resolved locations seen during the run
    fn coverage(&self) -> BTreeSet<Location>;

    fn record(&self) -> &CallRecord;

    fn record_mut(&mut self) -> &mut CallRecord;

    /// Distinct units appearing in the coverage
    fn covered_units(&self) -> BTreeSet<ExecutableUnit> {
        self.coverage().into_iter().map(|loc| loc.unit).collect()
    }

    /// Entry point for events delivered by a session
    fn trace_event(&mut self, frame: &Frame, kind: EventKind, value: Option<&str>) {
        if self.record().ignore.should_ignore(frame) {
            return;
        }
        if kind == EventKind::Call && !self.record().has_call() {
            self.record_mut().capture_call(frame);
        }
        self.collect(frame, kind, value);
    }

    /// The unit of the first call collected
    fn function(&self) -> Result<ExecutableUnit> {
        self.record()
            .function
            .clone()
            .ok_or(TraceError::NoCallCollected)
    }

    /// Arguments of the first call collected
    fn args(&self) -> Result<&[(String, String)]> {
        if self.record().has_call() {
            Ok(&self.record().args)
        } else {
            Err(TraceError::NoCallCollected)
        }
    }

    /// Arguments of the first call as `name=value, ...`
    fn argstring(&self) -> Result<String> {
        self.args().map(render_args)
    }

    /// The first call as `function(name=value, ...)`
    fn id(&self) -> Result<String> {
        Ok(format!("{}({})", self.function()?, self.argstring()?))
    }

    /// Description of the fault the run ended with, if any
    fn exception(&self) -> Option<&str> {
        self.record().exception.as_deref()
    }

    fn add_items_to_ignore(&mut self, items: Vec<IgnoreItem>) {
        self.record_mut().ignore.extend(items);
    }

    fn has_event(&self, event: &Event) -> bool {
        self.events().contains(event)
    }
}

/// Records the lines reached in every unit
#[derive(Debug, Default)]
pub struct CoverageCollector {
    record: CallRecord,
    locations: BTreeSet<Location>,
    events: BTreeSet<Event>,
}

impl CoverageCollector {
    pub fn new(ignore: IgnoreSet) -> Self {
        Self {
            record: CallRecord::new(ignore),
            ..Self::default()
        }
    }
}

impl EventCollector for CoverageCollector {
    fn collect(&mut self, frame: &Frame, _kind: EventKind, _value: Option<&str>) {
        let unit = self.record.resolver_mut().resolve_unit(frame);
        let location = Location::new(unit, frame.line());
        self.events.insert(location.event());
        self.locations.insert(location);
    }

    fn events(&self) -> &BTreeSet<Event> {
        &self.events
    }

    fn coverage(&self) -> BTreeSet<Location> {
        self.locations.clone()
    }

    fn record(&self) -> &CallRecord {
        &self.record
    }

    fn record_mut(&mut self) -> &mut CallRecord {
        &mut self.record
    }
}

/// Only identifies the run; keeps no events
#[derive(Debug, Default)]
pub struct NullCollector {
    record: CallRecord,
    events: BTreeSet<Event>,
}

impl NullCollector {
    pub fn new(ignore: IgnoreSet) -> Self {
        Self {
            record: CallRecord::new(ignore),
            events: BTreeSet::new(),
        }
    }
}

impl EventCollector for NullCollector {
    fn collect(&mut self, _frame: &Frame, _kind: EventKind, _value: Option<&str>) {}

    fn events(&self) -> &BTreeSet<Event> {
        &self.events
    }

    fn coverage(&self) -> BTreeSet<Location> {
        BTreeSet::new()
    }

    fn record(&self) -> &CallRecord {
        &self.record
    }

    fn record_mut(&mut self) -> &mut CallRecord {
        &mut self.record
    }
}

/// A completed run rebuilt from saved data
///
/// Live events are rejected; the events are fixed at construction.
#[derive(Debug)]
pub struct RecordedCollector {
    record: CallRecord,
    events: BTreeSet<Event>,
}

impl RecordedCollector {
    pub fn new(
        entry: impl Into<String>,
        args: Vec<(String, String)>,
        events: impl IntoIterator<Item = Event>,
    ) -> Self {
        Self {
            record: CallRecord::with_call(ExecutableUnit::named(entry), args),
            events: events.into_iter().collect(),
        }
    }

    /// A run in which no call was collected
    pub fn without_call(events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            record: CallRecord::default(),
            events: events.into_iter().collect(),
        }
    }

    pub fn with_exception(mut self, description: Option<String>) -> Self {
        self.record.set_exception(description);
        self
    }
}

impl EventCollector for RecordedCollector {
    fn collect(&mut self, _frame: &Frame, _kind: EventKind, _value: Option<&str>) {}

    fn trace_event(&mut self, frame: &Frame, kind: EventKind, _value: Option<&str>) {
        debug!("Recorded collector rejects live {} event of {}", kind, frame.name());
    }

    fn events(&self) -> &BTreeSet<Event> {
        &self.events
    }

    fn coverage(&self) -> BTreeSet<Location> {
        self.events
            .iter()
            .map(|e| Location::new(ExecutableUnit::named(e.function.clone()), e.line))
            .collect()
    }

    fn record(&self) -> &CallRecord {
        &self.record
    }

    fn record_mut(&mut self) -> &mut CallRecord {
        &mut self.record
    }
}

/// Which collector a session creates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorKind {
    #[default]
    Coverage,
    Null,
}

impl CollectorKind {
    pub fn build(self, ignore: IgnoreSet) -> Box<dyn EventCollector> {
        match self {
            CollectorKind::Coverage => Box::new(CoverageCollector::new(ignore)),
            CollectorKind::Null => Box::new(NullCollector::new(ignore)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{enter, enter_internal, probe, CallSite};

    fn site(name: &'static str, line: u32) -> CallSite {
        CallSite::new(name, module_path!(), file!(), line)
    }

    fn feed(collector: &mut dyn EventCollector) {
        let outer = enter(site("outer", 10), vec![("x", "3".to_string())]);
        collector.trace_event(outer.frame(), EventKind::Call, None);
        probe(11);
        collector.trace_event(outer.frame(), EventKind::Line, None);
        {
            let inner = enter(site("inner", 20), vec![("y", "4".to_string())]);
            collector.trace_event(inner.frame(), EventKind::Call, None);
            probe(21);
            collector.trace_event(inner.frame(), EventKind::Line, None);
        }
    }

    #[test]
    fn test_coverage_records_every_event_line() {
        let mut collector = CoverageCollector::new(IgnoreSet::new());
        feed(&mut collector);

        let events: Vec<_> = collector.events().iter().cloned().collect();
        assert_eq!(
            events,
            vec![
                Event::new("inner", 20),
                Event::new("inner", 21),
                Event::new("outer", 10),
                Event::new("outer", 11),
            ]
        );
        let units: Vec<_> = collector
            .covered_units()
            .iter()
            .map(|u| u.name().to_string())
            .collect();
        assert_eq!(units, vec!["inner", "outer"]);
        assert_eq!(collector.coverage().len(), 4);
    }

    #[test]
    fn test_first_call_identifies_run() {
        let mut collector = CoverageCollector::new(IgnoreSet::new());
        feed(&mut collector);
        assert_eq!(collector.function().unwrap().name(), "outer");
        assert_eq!(collector.argstring().unwrap(), "x=3");
        assert_eq!(collector.id().unwrap(), "outer(x=3)");
    }

    #[test]
    fn test_no_call_collected() {
        let collector = CoverageCollector::new(IgnoreSet::new());
        assert!(matches!(collector.function(), Err(TraceError::NoCallCollected)));
        assert!(matches!(collector.args(), Err(TraceError::NoCallCollected)));
        assert!(matches!(collector.argstring(), Err(TraceError::NoCallCollected)));
        assert!(matches!(collector.id(), Err(TraceError::NoCallCollected)));
    }

    #[test]
    fn test_ignored_frames_are_skipped() {
        let mut collector = CoverageCollector::new(IgnoreSet::new());
        collector.add_items_to_ignore(vec![IgnoreItem::function("outer")]);
        feed(&mut collector);
        assert_eq!(collector.function().unwrap().name(), "inner");
        assert!(collector.events().iter().all(|e| e.function == "inner"));
    }

    #[test]
    fn test_internal_frames_never_collected() {
        let mut collector = CoverageCollector::new(IgnoreSet::new());
        let guard = enter_internal(site("dispatch", 1));
        collector.trace_event(guard.frame(), EventKind::Call, None);
        assert!(collector.events().is_empty());
        assert!(!collector.record().has_call());
    }

    #[test]
    fn test_null_collector_identifies_without_events() {
        let mut collector = NullCollector::new(IgnoreSet::new());
        feed(&mut collector);
        assert!(collector.events().is_empty());
        assert!(collector.covered_units().is_empty());
        assert_eq!(collector.id().unwrap(), "outer(x=3)");
    }

    #[test]
    fn test_recorded_collector_rejects_live_events() {
        let mut collector = RecordedCollector::new(
            "middle",
            vec![("x".to_string(), "1".to_string())],
            [Event::new("middle", 4)],
        );
        feed(&mut collector);
        assert_eq!(collector.events().len(), 1);
        assert_eq!(collector.id().unwrap(), "middle(x=1)");
        assert!(collector.has_event(&Event::new("middle", 4)));
        assert_eq!(collector.covered_units().len(), 1);
    }

    #[test]
    fn test_collector_kind_builds_variant() {
        let mut null = CollectorKind::Null.build(IgnoreSet::new());
        feed(null.as_mut());
        assert!(null.events().is_empty());

        let mut coverage = CollectorKind::default().build(IgnoreSet::new());
        feed(coverage.as_mut());
        assert_eq!(coverage.events().len(), 4);
    }
}
