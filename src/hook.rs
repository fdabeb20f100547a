//! The per-thread trace callback slot
//!
//! Exactly one [`TraceHook`] receives the events of a thread at a time.
//! Installing a hook hands back a [`HookSlot`] guard that puts the previously
//! installed hook back when it is restored or dropped, so sessions can nest
//! sequentially and unwinding never leaves a stale hook behind.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::event::EventKind;
use crate::frame::Frame;

thread_local! {
    static SLOT: RefCell<Option<Rc<dyn TraceHook>>> = const { RefCell::new(None) };
    static DISPATCHING: Cell<u32> = const { Cell::new(0) };
}

/// Receives every event delivered by instrumented code
pub trait TraceHook {
    fn on_event(&self, frame: &Frame, kind: EventKind, value: Option<&str>);
}

/// Ownership of the slot for as long as a hook is installed
#[must_use = "the previous hook is restored as soon as the slot is dropped"]
pub struct HookSlot {
    previous: Option<Rc<dyn TraceHook>>,
    restored: bool,
}

impl HookSlot {
    /// Install `hook`, remembering whichever hook was installed before
    pub fn install(hook: Rc<dyn TraceHook>) -> Self {
        let previous = SLOT.with(|slot| slot.replace(Some(hook)));
        Self {
            previous,
            restored: false,
        }
    }

    /// Put the previous hook back
    pub fn restore(mut self) {
        self.restore_previous();
    }

    fn restore_previous(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;
        let previous = self.previous.take();
        SLOT.with(|slot| {
            slot.replace(previous);
        });
    }
}

impl Drop for HookSlot {
    fn drop(&mut self) {
        self.restore_previous();
    }
}

/// The hook currently installed on this thread
pub fn installed() -> Option<Rc<dyn TraceHook>> {
    SLOT.with(|slot| slot.borrow().clone())
}

pub fn is_installed() -> bool {
    SLOT.with(|slot| slot.borrow().is_some())
}

/// True while the installed hook is handling an event on this thread
pub fn is_dispatching() -> bool {
    DISPATCHING.with(|d| d.get() > 0)
}

struct Reentry;

impl Reentry {
    fn enter() -> Self {
        DISPATCHING.with(|d| d.set(d.get() + 1));
        Reentry
    }
}

impl Drop for Reentry {
    fn drop(&mut self) {
        DISPATCHING.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Deliver one event to the installed hook
///
/// Tracer-owned frames, events raised while the hook is already running and
/// events raised during unwinding are dropped.
pub(crate) fn dispatch(frame: &Frame, kind: EventKind, value: Option<&str>) {
    if frame.is_internal() || std::thread::panicking() || is_dispatching() {
        return;
    }
    let Some(hook) = installed() else {
        return;
    };
    let _reentry = Reentry::enter();
    hook.on_event(frame, kind, value);
}
