#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use scheduler_recovery::{
    PendingTask, Reconciler, SchedulerState, StalePendingPolicy, TaskRecord,
};

#[derive(Arbitrary, Debug)]
struct Input {
    node: String,
    payload: Vec<u8>,
    pending: Vec<String>,
    remove_stale: bool,
}

fuzz_target!(|input: Input| {
    let Ok(record) = TaskRecord::from_document(&input.node, &input.payload) else {
        return;
    };

    // Whatever decodes must re-encode and decode to the same record.
    let bytes = record.to_document().expect("decoded record must encode");
    let again = TaskRecord::from_document(&input.node, &bytes).expect("re-decode");
    assert_eq!(again, record);

    let policy = if input.remove_stale {
        StalePendingPolicy::Remove
    } else {
        StalePendingPolicy::Retain
    };
    let mut state = SchedulerState::with_pending(input.pending.into_iter().map(PendingTask::new));
    let before = state.pending().len();
    let tracked_before = state.launched().len() + state.to_kill().len();

    if Reconciler::new(policy).apply(record, &mut state).is_ok() {
        let tracked_after = state.launched().len() + state.to_kill().len();
        assert!(before - state.pending().len() <= 1);
        assert!(tracked_after - tracked_before <= 1);
        assert_eq!(state.launched().len(), state.to_reconcile().len());
    }
});
