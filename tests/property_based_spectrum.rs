//! Property-based tests for spectrum statistics
//!
//! Random spectra are built from recorded runs over a small line space so
//! that events are shared between runs often.

use std::collections::BTreeSet;

use proptest::prelude::*;
use tarantula::{Event, Outcome, RecordedCollector, SpectrumEngine};

fn run_strategy() -> impl Strategy<Value = (bool, BTreeSet<u32>)> {
    (any::<bool>(), prop::collection::btree_set(1u32..12, 0..8))
}

fn build_engine(runs: &[(bool, BTreeSet<u32>)]) -> SpectrumEngine {
    let mut engine = SpectrumEngine::new();
    for (failed, lines) in runs {
        let outcome = if *failed { Outcome::Fail } else { Outcome::Pass };
        let events = lines.iter().map(|line| Event::new("target", *line));
        engine.add_collector(
            outcome,
            Box::new(RecordedCollector::new("target", Vec::new(), events)),
        );
    }
    engine
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_suspiciousness_within_bounds(runs in prop::collection::vec(run_strategy(), 0..20)) {
        // Property: every observed event scores in [0, 1]
        let engine = build_engine(&runs);
        for event in engine.all_events(None) {
            let score = engine.suspiciousness(&event);
            prop_assert!(score.is_some());
            let score = score.unwrap();
            prop_assert!((0.0..=1.0).contains(&score), "{} scored {}", event, score);
        }
    }

    #[test]
    fn prop_unobserved_event_has_no_score(runs in prop::collection::vec(run_strategy(), 0..20)) {
        let engine = build_engine(&runs);
        prop_assert_eq!(engine.suspiciousness(&Event::new("target", 99)), None);
        prop_assert_eq!(engine.suspiciousness(&Event::new("other", 1)), None);
    }

    #[test]
    fn prop_rank_is_sorted_permutation(runs in prop::collection::vec(run_strategy(), 0..20)) {
        let engine = build_engine(&runs);
        let ranked = engine.ranked();

        let ranked_events: Vec<_> = ranked.iter().map(|(e, _)| e.clone()).collect();
        let unique: BTreeSet<_> = ranked_events.iter().cloned().collect();
        prop_assert_eq!(unique.len(), ranked_events.len());
        prop_assert_eq!(unique, engine.all_events(None));
        prop_assert_eq!(engine.rank(), ranked_events);

        for pair in ranked.windows(2) {
            prop_assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn prop_exclusive_events_score_extremes(runs in prop::collection::vec(run_strategy(), 0..20)) {
        let engine = build_engine(&runs);
        for event in engine.only_fail_events() {
            prop_assert_eq!(engine.suspiciousness(&event), Some(1.0));
        }
        for event in engine.only_pass_events() {
            prop_assert_eq!(engine.suspiciousness(&event), Some(0.0));
        }
    }

    #[test]
    fn prop_fraction_zero_for_empty_bucket(lines in prop::collection::btree_set(1u32..12, 1..8)) {
        // Property: only PASS runs filed, so every FAIL fraction is 0.0
        let engine = build_engine(&[(false, lines.clone())]);
        for line in lines {
            let event = Event::new("target", line);
            prop_assert_eq!(engine.event_fraction(&event, Outcome::Fail), 0.0);
            prop_assert_eq!(engine.event_fraction(&event, Outcome::Pass), 1.0);
        }
    }

    #[test]
    fn prop_fractions_count_collectors(runs in prop::collection::vec(run_strategy(), 1..20)) {
        let engine = build_engine(&runs);
        for event in engine.all_events(None) {
            for outcome in Outcome::ALL {
                let with = engine.collectors_with_event(&event, outcome).len();
                let without = engine.collectors_without_event(&event, outcome).len();
                let total = engine.run_count(Some(outcome));
                prop_assert_eq!(with + without, total);
                if total > 0 {
                    let expected = with as f64 / total as f64;
                    prop_assert!((engine.event_fraction(&event, outcome) - expected).abs() < 1e-12);
                }
            }
        }
    }
}
