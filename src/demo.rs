//! The `middle` example: a small function with a known bug
//!
//! `middle(x, y, z)` should return the median of its arguments but returns
//! `y` where it should return `x` on one branch. Only one of the six classic
//! test inputs reaches that branch, so the faulty line ranks first.

use crate::error::Result;
use crate::spectrum::SpectrumEngine;
use crate::{enter, probe, register_unit};

/// `(x, y, z, expected median)`
pub const DEMO_INPUTS: [(i32, i32, i32, i32); 6] = [
    (3, 3, 5, 3),
    (1, 2, 3, 2),
    (3, 2, 1, 2),
    (5, 5, 5, 5),
    (5, 3, 4, 4),
    (2, 1, 3, 2),
];

/// Median of three values, with a bug on the `x < z` branch
pub fn middle(x: i32, y: i32, z: i32) -> i32 {
    let frame = enter!(x, y, z);
    probe!();
    if y < z {
        probe!();
        if x < y {
            probe!();
            return frame.returns(y);
        } else if x < z {
            probe!();
            return frame.returns(y);
        }
    } else {
        probe!();
        if x > y {
            probe!();
            return frame.returns(y);
        } else if x > z {
            probe!();
            return frame.returns(x);
        }
    }
    probe!();
    frame.returns(z)
}
register_unit!(middle);

/// Trace `middle` over [`DEMO_INPUTS`], checking each result
pub fn run_demo(engine: &mut SpectrumEngine) -> Result<()> {
    for (x, y, z, expected) in DEMO_INPUTS {
        let traced = engine.run(|| {
            let m = middle(x, y, z);
            assert_eq!(m, expected, "middle({}, {}, {})", x, y, z);
        })?;
        tracing::info!("middle({}, {}, {}): {}", x, y, z, traced.outcome);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Outcome;

    #[test]
    fn test_middle_bug() {
        assert_eq!(middle(1, 2, 3), 2);
        assert_eq!(middle(3, 2, 1), 2);
        assert_eq!(middle(2, 1, 3), 1);
    }

    #[test]
    fn test_demo_ranks_faulty_line_first() {
        let mut engine = SpectrumEngine::new();
        run_demo(&mut engine).unwrap();
        assert_eq!(engine.run_count(Some(Outcome::Pass)), 5);
        assert_eq!(engine.run_count(Some(Outcome::Fail)), 1);
        assert_eq!(engine.entry_unit().unwrap().name(), "middle");

        let ranked = engine.ranked();
        let (top, score) = &ranked[0];
        assert_eq!(top.function, "middle");
        assert!(*score > 0.5);
        assert!(engine.only_fail_events().is_empty());
    }
}
