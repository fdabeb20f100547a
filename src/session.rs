//! Trace sessions
//!
//! A [`TraceSession`] observes exactly one run. Entering it installs a
//! dispatcher into the thread's hook slot; exiting restores the previous hook
//! and classifies the run:
//!
//! 1. A fault whose traceback passes through a tracer-owned frame is an
//!    internal error and is re-raised unmodified.
//! 2. A run that never reached a qualifying call is not a run: without a
//!    fault this is [`TraceError::NoCallCollected`], with an error fault it is
//!    [`TraceError::FaultWithoutCall`] and with a panic the panic is re-raised.
//! 3. Otherwise the run is FAIL if a fault ended it and PASS if not, unless
//!    the caller fixed the outcome in advance with [`TraceSession::expect`].

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic;
use std::rc::Rc;

use tracing::{debug, error, trace};

use crate::collector::{EventCollector, NullCollector};
use crate::error::{Result, TraceError};
use crate::event::{EventKind, Outcome};
use crate::frame::{self, enter_internal, CallSite, Frame};
use crate::hook::{HookSlot, TraceHook};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Completed(Outcome),
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Active => "Active",
            SessionState::Completed(_) => "Completed",
        }
    }
}

/// What ended a run abnormally
pub enum Fault {
    /// A panic, carrying its original payload
    Panic(Box<dyn Any + Send>),
    /// An error returned by the traced block
    Error(String),
}

impl Fault {
    /// Human-readable description of the fault
    pub fn describe(&self) -> String {
        match self {
            Fault::Panic(payload) => panic_message(payload.as_ref()),
            Fault::Error(message) => message.clone(),
        }
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Panic(_) => write!(f, "Panic({:?})", self.describe()),
            Fault::Error(message) => write!(f, "Error({:?})", message),
        }
    }
}

/// Best-effort message of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// A classified run, ready to be filed
#[derive(Debug)]
pub struct Completion {
    pub outcome: Outcome,
    pub collector: Box<dyn EventCollector>,
    pub fault: Option<String>,
}

/// The hook a session installs
#[derive(Debug)]
struct Dispatcher {
    collector: RefCell<Box<dyn EventCollector>>,
    log_events: bool,
}

impl TraceHook for Dispatcher {
    fn on_event(&self, frame: &Frame, kind: EventKind, value: Option<&str>) {
        let _internal = enter_internal(CallSite::new(
            "on_event",
            module_path!(),
            file!(),
            line!(),
        ));
        if self.log_events {
            match value {
                Some(value) => trace!("{} {}:{} -> {}", kind, frame.name(), frame.line(), value),
                None => trace!("{} {}:{}", kind, frame.name(), frame.line()),
            }
        }
        self.collector.borrow_mut().trace_event(frame, kind, value);
    }
}

/// Observes one run of instrumented code
pub struct TraceSession {
    state: SessionState,
    dispatcher: Rc<Dispatcher>,
    slot: Option<HookSlot>,
    expected: Option<Outcome>,
}

impl TraceSession {
    pub fn new(collector: Box<dyn EventCollector>) -> Self {
        Self {
            state: SessionState::Idle,
            dispatcher: Rc::new(Dispatcher {
                collector: RefCell::new(collector),
                log_events: false,
            }),
            slot: None,
            expected: None,
        }
    }

    /// Emit a `trace!` line for every dispatched event
    pub fn log_events(mut self, enabled: bool) -> Self {
        if let Some(dispatcher) = Rc::get_mut(&mut self.dispatcher) {
            dispatcher.log_events = enabled;
        }
        self
    }

    /// File the run under `outcome` whatever happens inside it
    pub fn expect(mut self, outcome: Option<Outcome>) -> Self {
        self.expected = outcome;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Start observing: `Idle -> Active`
    pub fn enter(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(TraceError::SessionState {
                from: self.state.name(),
                to: "Active",
            });
        }
        frame::clear_traceback();
        let hook: Rc<dyn TraceHook> = self.dispatcher.clone();
        self.slot = Some(HookSlot::install(hook));
        self.state = SessionState::Active;
        debug!("Trace session entered");
        Ok(())
    }

    /// Stop observing and classify the run: `Active -> Completed`
    ///
    /// Internal tracer errors and panics of runs without a collected call are
    /// re-raised with their original payload.
    pub fn exit(&mut self, fault: Option<Fault>) -> Result<Completion> {
        if self.state != SessionState::Active {
            return Err(TraceError::SessionState {
                from: self.state.name(),
                to: "Completed",
            });
        }
        if let Some(slot) = self.slot.take() {
            slot.restore();
        }

        let traceback = frame::take_traceback();
        if let Some(Fault::Panic(payload)) = fault {
            if traceback.iter().any(|entry| entry.internal) {
                error!(
                    "Internal tracer error: {} (traceback: {:?})",
                    panic_message(payload.as_ref()),
                    traceback
                );
                panic::resume_unwind(payload);
            }
            if !self.dispatcher.collector.borrow().record().has_call() {
                debug!("No call collected; re-raising fault");
                panic::resume_unwind(payload);
            }
            return Ok(self.complete(Some(Fault::Panic(payload))));
        }

        if !self.dispatcher.collector.borrow().record().has_call() {
            return Err(match fault {
                Some(Fault::Error(message)) => TraceError::FaultWithoutCall(message),
                _ => TraceError::NoCallCollected,
            });
        }
        Ok(self.complete(fault))
    }

    fn complete(&mut self, fault: Option<Fault>) -> Completion {
        let observed = if fault.is_some() {
            Outcome::Fail
        } else {
            Outcome::Pass
        };
        let outcome = self.expected.unwrap_or(observed);
        let description = fault.as_ref().map(Fault::describe);

        let mut collector = self
            .dispatcher
            .collector
            .replace(Box::new(NullCollector::default()));
        collector.record_mut().set_exception(description.clone());

        self.state = SessionState::Completed(outcome);
        debug!(
            "Trace session completed: {} ({})",
            outcome,
            collector.id().unwrap_or_default()
        );
        Completion {
            outcome,
            collector,
            fault: description,
        }
    }
}

impl fmt::Debug for TraceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceSession")
            .field("state", &self.state)
            .field("expected", &self.expected)
            .finish()
    }
}
