// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use chrono::NaiveDate;
use nightly_runner::history::{HistoryStore, PreviousStatuses, WriteMode};
use proptest::prelude::*;
use test_strategy::proptest;

// Rerunning a day's check in clean mode, any number of times and with any mix of appends in
// between, leaves the record of the last clean run.
#[proptest(cases = 16)]
fn clean_reruns_are_idempotent(
    #[strategy(1usize..4)] reruns: usize,
    #[strategy(prop::collection::vec(any::<bool>(), 0..3))] appends: Vec<bool>,
) {
    let tree = BuildTree::new();
    let config = tree.em_build().expect("config loads");
    let store = HistoryStore::new(config.store().dir(), config.store().daily_branch());
    let date = NaiveDate::from_ymd_opt(2024, 3, 2).expect("valid date");
    let record = run_check(&config, &PreviousStatuses::default())
        .expect("check succeeds")
        .into_record(date, "develop");

    for append in appends {
        let mode = if append { WriteMode::Append } else { WriteMode::Clean };
        store.write(&record, mode).expect("record written");
    }
    for _ in 0..reruns {
        store.write(&record, WriteMode::Clean).expect("record written");
    }

    let stored = store.read("develop", date, "imp").expect("record read");
    prop_assert_eq!(stored, Some(record));
}
