//! Property tests for the epoch engine.

use epochtap_core::{
    Adjustment, Decision, EpochEngine, Outcome, RenewalPolicy, TrackedRecord,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Wait(i64),
    Tick,
    Status,
    Decide(Decision),
    Adjust(Adjustment),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0i64..900).prop_map(Step::Wait),
        Just(Step::Tick),
        Just(Step::Status),
        Just(Step::Decide(Decision::Tapped)),
        Just(Step::Decide(Decision::Skipped)),
        Just(Step::Adjust(Adjustment::Add)),
        Just(Step::Adjust(Adjustment::Remove)),
    ]
}

proptest! {
    #[test]
    fn last_epoch_never_decreases_and_credits_at_most_one(steps in prop::collection::vec(step(), 1..80)) {
        let engine = EpochEngine::default();
        let mut record = TrackedRecord::new(0, "chat", RenewalPolicy::Terminal);
        let mut now = 0i64;

        for step in steps {
            match step {
                Step::Wait(secs) => now += secs,
                Step::Tick | Step::Status => {
                    let forced = matches!(step, Step::Status);
                    let eval = engine.evaluate(&record, now, forced);
                    prop_assert!(eval.record.last_epoch_emitted >= record.last_epoch_emitted);
                    prop_assert!(eval.record.tapped_epochs <= record.tapped_epochs + 1);
                    if eval.changed() {
                        prop_assert_eq!(eval.record.pending_decision, None);
                    }
                    record = eval.record;
                }
                Step::Decide(d) => record.record_decision(d),
                Step::Adjust(a) => {
                    let before = record.tapped_epochs;
                    record.adjust_tapped(a);
                    if a == Adjustment::Remove {
                        prop_assert_eq!(record.tapped_epochs, before.saturating_sub(1));
                    }
                }
            }
        }
    }

    #[test]
    fn second_tick_at_same_instant_is_silent(
        start in 0i64..1_000_000,
        offset in 0i64..(288 * 300),
        tapped in any::<bool>(),
    ) {
        let engine = EpochEngine::default();
        let mut record = TrackedRecord::new(start, "chat", RenewalPolicy::Renew);
        if tapped {
            record.record_decision(Decision::Tapped);
        }
        let now = start + offset;

        let first = engine.evaluate(&record, now, false);
        let second = engine.evaluate(&first.record, now, false);
        prop_assert_eq!(second.outcome, Outcome::Unchanged);
        prop_assert!(second.emission.is_none());
        prop_assert_eq!(&second.record, &first.record);
    }

    #[test]
    fn emission_counters_are_consistent(start in 0i64..1_000_000, offset in 0i64..(288 * 300), tapped in 0u32..400) {
        let engine = EpochEngine::default();
        let mut record = TrackedRecord::new(start, "chat", RenewalPolicy::Terminal);
        record.tapped_epochs = tapped;

        let report = engine.evaluate(&record, start + offset, true).emission.unwrap();
        prop_assert_eq!(report.current_epoch + report.remaining_epochs, 288);
        prop_assert_eq!(report.used_taps, tapped as u64 * 70);
        prop_assert_eq!(report.remaining_taps, 12_000u64.saturating_sub(report.used_taps));
        match report.tier.tier {
            Some(t) => prop_assert_eq!(report.remaining_in_tier, t.upper - tapped),
            None => prop_assert_eq!(report.remaining_in_tier, 0),
        }
    }
}
