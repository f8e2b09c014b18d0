//! Model-based property tests.
//!
//! Random operation sequences are applied to the naive model and to the real
//! timeline; every result and the final observable state must agree.
//!
//! ```text
//! proptest bytes ─▶ arbitrary ─▶ Vec<Operation>
//!                                     │
//!                      ┌──────────────┼──────────────┐
//!                      ▼              ▼              ▼
//!               ModelTimeline   RealTimeline      Compare
//! ```

#![allow(clippy::unwrap_used)]

use arbitrary::{Arbitrary, Unstructured};
use proptest::prelude::*;
use strand_harness::{
    InvariantRegistry, ModelTimeline, Operation, OperationError, RealTimeline, SmallEvent,
    SmallKind,
};
use strand_timeline::SendState;

fn operations(bytes: &[u8]) -> Vec<Operation> {
    let mut u = Unstructured::new(bytes);
    Vec::<Operation>::arbitrary(&mut u).unwrap_or_default()
}

fn event(id: u8, kind: SmallKind, target: u8, time: u8) -> SmallEvent {
    SmallEvent { id, sender: 1, kind, target, time, variant: id }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Results and observable state match between model and real timeline.
    #[test]
    fn prop_model_matches_real(
        seed in any::<u64>(),
        bytes in prop::collection::vec(any::<u8>(), 0..2048)
    ) {
        let ops = operations(&bytes);
        let mut model = ModelTimeline::new();
        let mut real = RealTimeline::new(seed).unwrap();

        for (i, op) in ops.iter().enumerate() {
            let model_result = model.apply(op);
            let real_result = real.apply(op);

            prop_assert_eq!(
                model_result,
                real_result,
                "Divergence at operation {}: {:?}",
                i, op
            );
        }

        let model_state = model.observable_state();
        let real_state = real.observable_state();

        prop_assert_eq!(&model_state.records, &real_state.records, "Store order divergence");
        prop_assert_eq!(&model_state.echoes, &real_state.echoes, "Echo tracking divergence");
        prop_assert_eq!(&model_state.rendered, &real_state.rendered, "Rendered view divergence");
        prop_assert_eq!(&model_state.preview, &real_state.preview, "Preview divergence");
    }

    /// Standard invariants hold after every operation.
    #[test]
    fn prop_invariants_hold_after_every_operation(
        seed in any::<u64>(),
        bytes in prop::collection::vec(any::<u8>(), 0..2048)
    ) {
        let registry = InvariantRegistry::standard();
        let mut real = RealTimeline::new(seed).unwrap();

        for (i, op) in operations(&bytes).iter().enumerate() {
            let _ = real.apply(op);
            if let Err(violations) = registry.check_all(&real.state()) {
                let report: Vec<String> = violations.iter().map(ToString::to_string).collect();
                prop_assert!(false, "after operation {} ({:?}): {:?}", i, op, report);
            }
        }
    }

    /// Replaying the same backfill page is a no-op.
    #[test]
    fn prop_backfill_replay_is_noop(
        bytes in prop::collection::vec(any::<u8>(), 0..512)
    ) {
        let mut u = Unstructured::new(&bytes);
        let events = Vec::<SmallEvent>::arbitrary(&mut u).unwrap_or_default();
        let mut real = RealTimeline::new(0).unwrap();

        real.apply(&Operation::Backfill { events: events.clone() }).unwrap();
        let once = real.observable_state();
        real.apply(&Operation::Backfill { events }).unwrap();

        prop_assert_eq!(once, real.observable_state());
    }
}

#[test]
fn confirm_supersedes_live_copy_in_both() {
    let ops = vec![
        Operation::Live { event: event(1, SmallKind::Message, 0, 0) },
        Operation::SendText { variant: 3 },
        // Live sync delivers the confirmed id before the send result.
        Operation::Live { event: event(5, SmallKind::Message, 0, 1) },
        Operation::Confirm { echo: 0, server_id: 10 },
    ];

    let mut model = ModelTimeline::new();
    let mut real = RealTimeline::new(9).unwrap();
    for op in &ops {
        assert_eq!(model.apply(op), real.apply(op));
    }

    let state = real.observable_state();
    assert_eq!(state, model.observable_state());
    let ids: Vec<&str> = state.records.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["$e1", "$e5"]);
    assert!(state.echoes.is_empty());
}

#[test]
fn failed_send_is_retried_at_the_tail() {
    let mut real = RealTimeline::new(3).unwrap();
    real.apply(&Operation::SendText { variant: 1 }).unwrap();
    real.apply(&Operation::Live { event: event(2, SmallKind::Message, 0, 0) }).unwrap();
    real.apply(&Operation::Fail { echo: 0 }).unwrap();

    assert_eq!(
        real.apply(&Operation::Confirm { echo: 0, server_id: 1 }),
        Err(OperationError::InvalidState)
    );
    real.apply(&Operation::Retry { echo: 0 }).unwrap();

    let state = real.observable_state();
    let ids: Vec<&str> = state.records.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["$e2", "~1"]);
    assert_eq!(state.echoes, vec![("~1".to_string(), SendState::Pending)]);
}

#[test]
fn empty_text_is_rejected_without_consuming_a_sequence() {
    let mut model = ModelTimeline::new();
    let mut real = RealTimeline::new(1).unwrap();

    for op in [Operation::SendText { variant: 0 }, Operation::SendText { variant: 5 }] {
        assert_eq!(model.apply(&op), real.apply(&op));
    }

    let state = real.observable_state();
    assert_eq!(state.echoes, vec![("~0".to_string(), SendState::Pending)]);
    assert_eq!(state, model.observable_state());
}

#[test]
fn redaction_echoes_and_removal_agree() {
    let ops = vec![
        Operation::Live { event: event(1, SmallKind::Message, 0, 0) },
        Operation::SendReaction { target: 1, variant: 0 },
        // Confirmed as $s3, then redacted by its own sender.
        Operation::Confirm { echo: 0, server_id: 3 },
        Operation::SendRedaction { target: 3, variant: 1 },
        // Pending redaction of the message, then it fails.
        Operation::SendRedaction { target: 2, variant: 0 },
        Operation::Fail { echo: 1 },
        Operation::Remove { target: 3 },
        Operation::Remove { target: 3 },
    ];

    let mut model = ModelTimeline::new();
    let mut real = RealTimeline::new(5).unwrap();
    let results: Vec<_> = ops
        .iter()
        .map(|op| {
            let result = real.apply(op);
            assert_eq!(model.apply(op), result, "{op:?}");
            result
        })
        .collect();

    assert_eq!(results[7], Err(OperationError::NoSuchRecord));
    let state = real.observable_state();
    assert_eq!(state, model.observable_state());
    let message = &state.rendered[0];
    assert_eq!(message.id, "$e1");
    assert!(!message.redacted);
    assert!(message.reactions.is_empty());
}
