//! Shadow call stack maintained by instrumented code
//!
//! Instrumented functions announce themselves with [`enter!`](crate::enter),
//! report reached lines with [`probe!`](crate::probe) and leave when the
//! returned [`FrameGuard`] drops. Every activation is a [`Frame`] linked to the
//! frame that was active when it was entered, so the stack can be walked
//! outward from any frame.
//!
//! A panic unwinding through a guarded frame records the frame into the
//! per-thread traceback buffer, innermost frame first. The buffer is cleared
//! by the next event delivered outside of unwinding.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::event::EventKind;
use crate::hook;

thread_local! {
    static CURRENT: RefCell<Option<Rc<Frame>>> = const { RefCell::new(None) };
    static TRACEBACK: RefCell<Vec<TracebackEntry>> = const { RefCell::new(Vec::new()) };
}

/// Static description of where a frame was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub name: &'static str,
    pub module_path: &'static str,
    pub file: &'static str,
    pub line: u32,
    /// Type whose `impl` block defines the unit, for methods
    pub owner: Option<&'static str>,
}

impl CallSite {
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
            owner: None,
        }
    }

    pub const fn with_owner(mut self, owner: Option<&'static str>) -> Self {
        self.owner = owner;
        self
    }
}

/// A live activation on the shadow call stack
pub struct Frame {
    site: CallSite,
    line: Cell<u32>,
    locals: Vec<(&'static str, String)>,
    internal: bool,
    parent: Option<Rc<Frame>>,
}

impl Frame {
    /// Name of the code unit this frame executes
    pub fn name(&self) -> &'static str {
        self.site.name
    }

    pub fn module_path(&self) -> &'static str {
        self.site.module_path
    }

    /// Type the unit is a method of, if any
    pub fn owner(&self) -> Option<&'static str> {
        self.site.owner
    }

    /// `module::Owner::name`, or `module::name` for free functions
    pub fn qualified_name(&self) -> String {
        match self.site.owner {
            Some(owner) => format!("{}::{}::{}", self.site.module_path, owner, self.site.name),
            None => format!("{}::{}", self.site.module_path, self.site.name),
        }
    }

    pub fn file(&self) -> &'static str {
        self.site.file
    }

    /// Line at which the frame was entered
    pub fn start_line(&self) -> u32 {
        self.site.line
    }

    /// Line most recently reached in this frame
    pub fn line(&self) -> u32 {
        self.line.get()
    }

    /// Argument bindings captured on entry, rendered with `Debug`
    pub fn locals(&self) -> &[(&'static str, String)] {
        &self.locals
    }

    /// True for frames pushed by the tracer itself
    pub fn is_internal(&self) -> bool {
        self.internal
    }

    /// The frame that was active when this one was entered
    pub fn parent(&self) -> Option<&Frame> {
        self.parent.as_deref()
    }

    /// Iterate from this frame outward to the outermost frame
    pub fn walk(&self) -> FrameWalk<'_> {
        FrameWalk { next: Some(self) }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("name", &self.site.name)
            .field("module_path", &self.site.module_path)
            .field("owner", &self.site.owner)
            .field("start_line", &self.site.line)
            .field("line", &self.line.get())
            .field("internal", &self.internal)
            .finish()
    }
}

/// Iterator over a frame and its enclosing frames
pub struct FrameWalk<'a> {
    next: Option<&'a Frame>,
}

impl<'a> Iterator for FrameWalk<'a> {
    type Item = &'a Frame;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.next?;
        self.next = frame.parent();
        Some(frame)
    }
}

/// One frame a panic unwound through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracebackEntry {
    pub function: &'static str,
    pub module_path: &'static str,
    pub line: u32,
    /// Set when the frame belongs to the tracer
    pub internal: bool,
}

/// Keeps a frame on the shadow stack until dropped
///
/// Dropping the guard normally delivers a `return` event. Dropping it while
/// unwinding records the frame into the traceback instead.
#[must_use = "the frame is left as soon as the guard is dropped"]
pub struct FrameGuard {
    frame: Rc<Frame>,
    returned: bool,
}

impl FrameGuard {
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Leave the frame, reporting `value` with the `return` event
    pub fn returns<T: fmt::Debug>(mut self, value: T) -> T {
        if !self.frame.internal {
            clear_traceback();
            let rendered = format!("{:?}", value);
            hook::dispatch(&self.frame, EventKind::Return, Some(&rendered));
        }
        self.returned = true;
        value
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        // Pop first: the return event may unwind out of the hook
        CURRENT.with(|current| {
            *current.borrow_mut() = self.frame.parent.clone();
        });
        if std::thread::panicking() {
            record_unwind(&self.frame);
        } else if !self.returned && !self.frame.internal {
            clear_traceback();
            hook::dispatch(&self.frame, EventKind::Return, None);
        }
    }
}

/// Push a frame for `site` and deliver its `call` event
pub fn enter(site: CallSite, locals: Vec<(&'static str, String)>) -> FrameGuard {
    clear_traceback();
    let guard = push(site, locals, false);
    hook::dispatch(&guard.frame, EventKind::Call, None);
    guard
}

/// Push a tracer-owned frame; it is never dispatched
pub(crate) fn enter_internal(site: CallSite) -> FrameGuard {
    push(site, Vec::new(), true)
}

fn push(site: CallSite, locals: Vec<(&'static str, String)>, internal: bool) -> FrameGuard {
    let parent = current_frame();
    let frame = Rc::new(Frame {
        site,
        line: Cell::new(site.line),
        locals,
        internal,
        parent,
    });
    CURRENT.with(|current| {
        *current.borrow_mut() = Some(Rc::clone(&frame));
    });
    FrameGuard {
        frame,
        returned: false,
    }
}

/// Move the innermost frame to `line` and deliver a `line` event
///
/// Probes outside of any entered frame are ignored.
pub fn probe(line: u32) {
    let Some(frame) = current_frame() else {
        return;
    };
    clear_traceback();
    frame.line.set(line);
    hook::dispatch(&frame, EventKind::Line, None);
}

/// The innermost frame of the current thread, if any
pub fn current_frame() -> Option<Rc<Frame>> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Take the frames the most recent panic unwound through, innermost first
pub fn take_traceback() -> Vec<TracebackEntry> {
    TRACEBACK.with(|tb| std::mem::take(&mut *tb.borrow_mut()))
}

pub(crate) fn clear_traceback() {
    TRACEBACK.with(|tb| tb.borrow_mut().clear());
}

fn record_unwind(frame: &Frame) {
    let entry = TracebackEntry {
        function: frame.name(),
        module_path: frame.module_path(),
        line: frame.line(),
        internal: frame.internal,
    };
    TRACEBACK.with(|tb| tb.borrow_mut().push(entry));
}

#[doc(hidden)]
pub fn type_name_of<T>(_: T) -> &'static str {
    std::any::type_name::<T>()
}

/// Split a type path on `::` outside of angle brackets
fn path_segments(path: &str) -> Vec<&str> {
    let bytes = path.as_bytes();
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                segments.push(&path[start..i]);
                i += 2;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    segments.push(&path[start..]);
    segments
}

fn strip_marker(marker_path: &str) -> &str {
    marker_path
        .strip_suffix("::__tarantula_here")
        .unwrap_or(marker_path)
}

/// Reduce the path of a marker item to the name of its enclosing unit
#[doc(hidden)]
pub fn unit_name_of(marker_path: &'static str) -> &'static str {
    let path = strip_marker(marker_path);
    path_segments(path).last().copied().unwrap_or(path)
}

/// Type owning the enclosing unit: `Checker` for `app::Checker::verify` and
/// for `<app::Checker as app::Verify>::verify`
#[doc(hidden)]
pub fn owner_of(marker_path: &'static str) -> Option<&'static str> {
    let segments = path_segments(strip_marker(marker_path));
    let candidate = *segments.iter().rev().nth(1)?;
    let candidate = match candidate.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        Some(qualified) => {
            let self_ty = qualified.split(" as ").next().unwrap_or(qualified);
            path_segments(self_ty).last().copied().unwrap_or(self_ty)
        }
        None => candidate,
    };
    let base = candidate.split('<').next().unwrap_or(candidate);
    base.starts_with(|c: char| c.is_ascii_uppercase())
        .then_some(base)
}

/// Path of the item the macro is expanded in, ending in a marker segment
#[doc(hidden)]
#[macro_export]
macro_rules! unit_path {
    () => {{
        fn __tarantula_here() {}
        $crate::frame::type_name_of(__tarantula_here)
    }};
}

/// Enter an instrumented frame, capturing the listed arguments
///
/// ```ignore
/// fn middle(x: i32, y: i32, z: i32) -> i32 {
///     let _frame = tarantula::enter!(x, y, z);
///     tarantula::probe!();
///     // ...
/// }
/// ```
///
/// Inside an `impl` block the frame also records the owning type.
/// `enter!(name = "custom", x)` overrides the derived unit name.
#[macro_export]
macro_rules! enter {
    (name = $name:expr $(, $arg:ident)* $(,)?) => {
        $crate::frame::enter(
            $crate::frame::CallSite::new($name, module_path!(), file!(), line!()),
            ::std::vec![$((stringify!($arg), ::std::format!("{:?}", $arg))),*],
        )
    };
    ($($arg:ident),* $(,)?) => {{
        let unit_path = $crate::unit_path!();
        $crate::frame::enter(
            $crate::frame::CallSite::new(
                $crate::frame::unit_name_of(unit_path),
                module_path!(),
                file!(),
                line!(),
            )
            .with_owner($crate::frame::owner_of(unit_path)),
            ::std::vec![$((stringify!($arg), ::std::format!("{:?}", $arg))),*],
        )
    }};
}

/// Report that the current line of the innermost frame was reached
#[macro_export]
macro_rules! probe {
    () => {
        $crate::frame::probe(line!())
    };
}
