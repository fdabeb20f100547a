//! Tarantula - spectrum-based fault localization for instrumented Rust code
//!
//! Instrumented functions report their calls and reached lines through a
//! per-thread shadow call stack. A [`SpectrumEngine`] traces many runs of
//! such code, files each run as PASS or FAIL and ranks every reached line by
//! its Tarantula suspiciousness.
//!
//! ```ignore
//! use tarantula::{enter, probe, SpectrumEngine};
//!
//! fn middle(x: i32, y: i32, z: i32) -> i32 {
//!     let frame = enter!(x, y, z);
//!     probe!();
//!     // ...
//!     frame.returns(z)
//! }
//!
//! let mut engine = SpectrumEngine::new();
//! engine.run(|| assert_eq!(middle(2, 1, 3), 2))?;
//! for (event, score) in engine.ranked() {
//!     println!("{:.3} {}", score, event);
//! }
//! ```

pub mod cli;
pub mod collector;
pub mod config;
pub mod demo;
pub mod error;
pub mod event;
pub mod filter;
pub mod frame;
pub mod hook;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod spectrum;
pub mod unit;

#[doc(hidden)]
pub use linkme;

pub use collector::{
    CollectorKind, CoverageCollector, EventCollector, Location, NullCollector, RecordedCollector,
};
pub use config::TracerConfig;
pub use error::{Result, TraceError};
pub use event::{Event, EventKind, Outcome};
pub use filter::{IgnoreItem, IgnoreSet};
pub use frame::{CallSite, Frame, FrameGuard};
pub use resolver::LocationResolver;
pub use session::{Fault, SessionState, TraceSession};
pub use spectrum::{
    CollectorFactory, RunRecord, ScopedSession, SpectrumEngine, SpectrumReport, Traced,
};
pub use unit::{ExecutableUnit, UnitOrigin};
