//! Spectrum-based fault localization
//!
//! The [`SpectrumEngine`] opens trace sessions, files each completed run under
//! its outcome and scores every observed event with the Tarantula formula:
//!
//! ```text
//! suspiciousness(e) = 1 - passed(e) / (passed(e) + failed(e))
//! ```
//!
//! where `passed(e)` and `failed(e)` are the fractions of PASS and FAIL runs
//! whose coverage contains `e`. Events seen only in failing runs score 1.0,
//! events seen only in passing runs score 0.0.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::collector::{CollectorKind, EventCollector, Location, RecordedCollector};
use crate::config::TracerConfig;
use crate::error::Result;
use crate::event::{Event, Outcome};
use crate::filter::{IgnoreItem, IgnoreSet};
use crate::session::{Completion, Fault, TraceSession};
use crate::unit::ExecutableUnit;

/// Result of one traced run
#[derive(Debug)]
pub struct Traced<R> {
    /// Outcome the run was filed under
    pub outcome: Outcome,
    /// Value returned by the block, if it completed
    pub value: Option<R>,
    /// Description of the fault that ended the run
    pub fault: Option<String>,
}

impl<R> Traced<R> {
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Pass
    }
}

/// Builds the collector of each run from the run's ignore set
pub type CollectorFactory = Box<dyn Fn(IgnoreSet) -> Box<dyn EventCollector>>;

/// Collects labeled runs and ranks events by suspiciousness
#[derive(Default)]
pub struct SpectrumEngine {
    collectors: BTreeMap<Outcome, Vec<Box<dyn EventCollector>>>,
    collector_kind: CollectorKind,
    factory: Option<CollectorFactory>,
    ignore: IgnoreSet,
    log_events: bool,
}

impl fmt::Debug for SpectrumEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumEngine")
            .field("collectors", &self.collectors)
            .field("collector_kind", &self.collector_kind)
            .field("custom_factory", &self.factory.is_some())
            .field("ignore", &self.ignore)
            .field("log_events", &self.log_events)
            .finish()
    }
}

impl SpectrumEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &TracerConfig) -> Result<Self> {
        Ok(Self {
            collector_kind: config.collector,
            ignore: config.ignore_set()?,
            log_events: config.log_events,
            ..Self::default()
        })
    }

    pub fn with_collector_kind(mut self, kind: CollectorKind) -> Self {
        self.collector_kind = kind;
        self
    }

    /// Build every run's collector with `factory` instead of the configured kind
    pub fn with_collector_factory(
        mut self,
        factory: impl Fn(IgnoreSet) -> Box<dyn EventCollector> + 'static,
    ) -> Self {
        self.factory = Some(Box::new(factory));
        self
    }

    fn new_collector(&self, ignore: IgnoreSet) -> Box<dyn EventCollector> {
        match &self.factory {
            Some(factory) => factory(ignore),
            None => self.collector_kind.build(ignore),
        }
    }

    /// Ignore set applied to every session opened by this engine
    pub fn with_ignore(mut self, ignore: IgnoreSet) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn log_events(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }

    // --- Sessions ---

    /// Start configuring a traced run
    pub fn session(&mut self) -> ScopedSession<'_> {
        ScopedSession {
            engine: self,
            expected: None,
            ignore: Vec::new(),
        }
    }

    /// Trace `block`, filing it as FAIL if it panics and PASS otherwise
    pub fn run<R>(&mut self, block: impl FnOnce() -> R) -> Result<Traced<R>> {
        self.session().run(block)
    }

    /// Trace `block`, filing it as FAIL if it panics or returns `Err`
    ///
    /// # Errors
    /// An `Err` returned before any call was collected comes back as
    /// [`TraceError::FaultWithoutCall`](crate::TraceError::FaultWithoutCall)
    /// carrying the error's text.
    pub fn try_run<R, E: fmt::Display>(
        &mut self,
        block: impl FnOnce() -> std::result::Result<R, E>,
    ) -> Result<Traced<R>> {
        self.session().try_run(block)
    }

    /// Trace `block` and file it under `outcome` regardless of how it ends
    pub fn run_as<R>(&mut self, outcome: Outcome, block: impl FnOnce() -> R) -> Result<Traced<R>> {
        self.session().expect(outcome).run(block)
    }

    fn file<R>(&mut self, completion: Completion, value: Option<R>) -> Traced<R> {
        let Completion {
            outcome,
            collector,
            fault,
        } = completion;
        debug!(
            "Filing {} run {} with {} events",
            outcome,
            collector.id().unwrap_or_default(),
            collector.events().len()
        );
        self.add_collector(outcome, collector);
        Traced {
            outcome,
            value,
            fault,
        }
    }

    // --- Collectors ---

    /// File a collector obtained out of band
    pub fn add_collector(&mut self, outcome: Outcome, collector: Box<dyn EventCollector>) {
        self.collectors.entry(outcome).or_default().push(collector);
    }

    pub fn collectors(&self, outcome: Outcome) -> &[Box<dyn EventCollector>] {
        self.collectors
            .get(&outcome)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn pass_collectors(&self) -> &[Box<dyn EventCollector>] {
        self.collectors(Outcome::Pass)
    }

    pub fn fail_collectors(&self) -> &[Box<dyn EventCollector>] {
        self.collectors(Outcome::Fail)
    }

    /// Number of runs filed under `outcome`, or in total
    pub fn run_count(&self, outcome: Option<Outcome>) -> usize {
        match outcome {
            Some(outcome) => self.collectors(outcome).len(),
            None => self.collectors.values().map(Vec::len).sum(),
        }
    }

    fn iter_collectors(
        &self,
        outcome: Option<Outcome>,
    ) -> impl Iterator<Item = &dyn EventCollector> {
        self.collectors
            .iter()
            .filter(move |(o, _)| outcome.map_or(true, |wanted| **o == wanted))
            .flat_map(|(_, list)| list.iter().map(|c| &**c))
    }

    // --- Events ---

    /// Union of the events of all runs under `outcome`, or of all runs
    pub fn all_events(&self, outcome: Option<Outcome>) -> BTreeSet<Event> {
        self.iter_collectors(outcome)
            .flat_map(|c| c.events().iter().cloned())
            .collect()
    }

    pub fn all_pass_events(&self) -> BTreeSet<Event> {
        self.all_events(Some(Outcome::Pass))
    }

    pub fn all_fail_events(&self) -> BTreeSet<Event> {
        self.all_events(Some(Outcome::Fail))
    }

    /// Events seen in failing runs and never in passing ones
    pub fn only_fail_events(&self) -> BTreeSet<Event> {
        &self.all_fail_events() - &self.all_pass_events()
    }

    /// Events seen in passing runs and never in failing ones
    pub fn only_pass_events(&self) -> BTreeSet<Event> {
        &self.all_pass_events() - &self.all_fail_events()
    }

    /// Resolved locations of all runs
    pub fn coverage(&self) -> BTreeSet<Location> {
        self.iter_collectors(None)
            .flat_map(|c| c.coverage().into_iter())
            .collect()
    }

    pub fn covered_units(&self) -> BTreeSet<ExecutableUnit> {
        self.iter_collectors(None)
            .flat_map(|c| c.covered_units().into_iter())
            .collect()
    }

    pub fn collectors_with_event(
        &self,
        event: &Event,
        outcome: Outcome,
    ) -> Vec<&dyn EventCollector> {
        self.iter_collectors(Some(outcome))
            .filter(|c| c.has_event(event))
            .collect()
    }

    pub fn collectors_without_event(
        &self,
        event: &Event,
        outcome: Outcome,
    ) -> Vec<&dyn EventCollector> {
        self.iter_collectors(Some(outcome))
            .filter(|c| !c.has_event(event))
            .collect()
    }

    // --- Statistics ---

    /// Fraction of the runs under `outcome` that reached `event`
    ///
    /// 0.0 when no run is filed under `outcome`.
    pub fn event_fraction(&self, event: &Event, outcome: Outcome) -> f64 {
        let total = self.run_count(Some(outcome));
        if total == 0 {
            return 0.0;
        }
        self.collectors_with_event(event, outcome).len() as f64 / total as f64
    }

    pub fn passed_fraction(&self, event: &Event) -> f64 {
        self.event_fraction(event, Outcome::Pass)
    }

    pub fn failed_fraction(&self, event: &Event) -> f64 {
        self.event_fraction(event, Outcome::Fail)
    }

    /// Tarantula score of `event`; `None` if no run reached it
    pub fn suspiciousness(&self, event: &Event) -> Option<f64> {
        let passed = self.passed_fraction(event);
        let failed = self.failed_fraction(event);
        if passed + failed > 0.0 {
            Some(1.0 - passed / (passed + failed))
        } else {
            None
        }
    }

    /// All observed events, most suspicious first
    pub fn rank(&self) -> Vec<Event> {
        self.ranked().into_iter().map(|(event, _)| event).collect()
    }

    /// [`rank`](Self::rank) together with each event's score
    ///
    /// # Panics
    ///
    /// If an observed event has no score, which cannot happen for a
    /// consistent engine.
    pub fn ranked(&self) -> Vec<(Event, f64)> {
        let mut scored: Vec<(Event, f64)> = self
            .all_events(None)
            .into_iter()
            .map(|event| {
                let score = self.suspiciousness(&event);
                assert!(score.is_some(), "observed event {} has no suspiciousness", event);
                (event, score.unwrap_or_default())
            })
            .collect();
        // Stable: equal scores keep ascending event order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
    }

    /// The unit every run started in, if all runs agree on its name
    pub fn entry_unit(&self) -> Option<ExecutableUnit> {
        let mut entries: Vec<ExecutableUnit> = Vec::new();
        for collector in self.iter_collectors(None) {
            let Ok(unit) = collector.function() else {
                continue;
            };
            if !entries.iter().any(|seen| seen.name() == unit.name()) {
                entries.push(unit);
            }
        }
        if entries.len() == 1 {
            entries.pop()
        } else {
            if entries.len() > 1 {
                debug!("Ambiguous entry point: {} candidates", entries.len());
            }
            None
        }
    }

    // --- Reports ---

    /// Serializable snapshot of every filed run
    pub fn report(&self) -> SpectrumReport {
        let runs = self
            .collectors
            .iter()
            .flat_map(|(outcome, list)| list.iter().map(move |c| (*outcome, c)))
            .map(|(outcome, collector)| RunRecord {
                outcome,
                entry: collector.function().ok().map(|unit| unit.name().to_string()),
                args: collector.args().map(<[_]>::to_vec).unwrap_or_default(),
                argstring: collector.argstring().unwrap_or_default(),
                exception: collector.exception().map(str::to_string),
                events: collector.events().iter().cloned().collect(),
            })
            .collect();
        SpectrumReport { runs }
    }

    /// Rebuild an engine from a saved report
    pub fn from_report(report: &SpectrumReport) -> Self {
        let mut engine = Self::new();
        for run in &report.runs {
            let events = run.events.iter().cloned();
            let collector = match &run.entry {
                Some(entry) => RecordedCollector::new(entry.clone(), run.args.clone(), events),
                None => RecordedCollector::without_call(events),
            }
            .with_exception(run.exception.clone());
            engine.add_collector(run.outcome, Box::new(collector));
        }
        info!("Loaded {} runs from report", report.runs.len());
        engine
    }
}

/// Builder for one traced run of a [`SpectrumEngine`]
pub struct ScopedSession<'a> {
    engine: &'a mut SpectrumEngine,
    expected: Option<Outcome>,
    ignore: Vec<IgnoreItem>,
}

impl<'a> ScopedSession<'a> {
    /// File the run under `outcome` whatever happens inside it
    pub fn expect(mut self, outcome: Outcome) -> Self {
        self.expected = Some(outcome);
        self
    }

    /// Exclude more code from this run only
    pub fn ignore(mut self, items: impl IntoIterator<Item = IgnoreItem>) -> Self {
        self.ignore.extend(items);
        self
    }

    pub fn run<R>(self, block: impl FnOnce() -> R) -> Result<Traced<R>> {
        let mut session = self.open()?;
        let (value, fault) = match panic::catch_unwind(AssertUnwindSafe(block)) {
            Ok(value) => (Some(value), None),
            Err(payload) => (None, Some(Fault::Panic(payload))),
        };
        let completion = session.exit(fault)?;
        Ok(self.engine.file(completion, value))
    }

    pub fn try_run<R, E: fmt::Display>(
        self,
        block: impl FnOnce() -> std::result::Result<R, E>,
    ) -> Result<Traced<R>> {
        let mut session = self.open()?;
        let (value, fault) = match panic::catch_unwind(AssertUnwindSafe(block)) {
            Ok(Ok(value)) => (Some(value), None),
            Ok(Err(err)) => (None, Some(Fault::Error(err.to_string()))),
            Err(payload) => (None, Some(Fault::Panic(payload))),
        };
        let completion = session.exit(fault)?;
        Ok(self.engine.file(completion, value))
    }

    fn open(&self) -> Result<TraceSession> {
        let mut ignore = self.engine.ignore.clone();
        ignore.extend(self.ignore.iter().cloned());
        let collector = self.engine.new_collector(ignore);
        let mut session = TraceSession::new(collector)
            .log_events(self.engine.log_events)
            .expect(self.expected);
        session.enter()?;
        Ok(session)
    }
}

/// One filed run in a [`SpectrumReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub outcome: Outcome,
    /// Name of the run's entry unit, absent if no call was collected
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub args: Vec<(String, String)>,
    #[serde(default)]
    pub argstring: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    pub events: Vec<Event>,
}

/// Saved runs of an engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectrumReport {
    pub runs: Vec<RunRecord>,
}

impl SpectrumReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
