// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use chrono::NaiveDate;
use color_eyre::eyre::{OptionExt, Result};
use nightly_metadata::{BuildVerdict, TestDelta, TestStatus};
use nightly_runner::{
    history::{DailyView, HistoryStore, PreviousStatuses, WriteMode},
    registry::UnitId,
};
use pretty_assertions::assert_eq;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).expect("valid date")
}

fn open_store(config: &nightly_runner::config::NightlyConfig) -> HistoryStore {
    HistoryStore::new(config.store().dir(), config.store().daily_branch())
}

#[test]
fn check_then_store() -> Result<()> {
    let tree = BuildTree::new();
    let config = tree.em_build()?;
    let store = open_store(&config);

    let record = run_check(&config, &PreviousStatuses::default())?.into_record(date(1), "develop");
    store.write(&record, WriteMode::Clean)?;
    assert!(
        store
            .record_path("develop", date(1), "imp")
            .starts_with(tree.root().join("nightly-history")),
        "relative store dirs are under the build root"
    );
    let stored = store.read("develop", date(1), "imp")?.ok_or_eyre("record was stored")?;
    assert_eq!(stored, record);

    // The next day's build sees the first day's statuses.
    tree.write(
        "build/logs/imp/fast8/em.test.xml",
        &em_report("passed"),
    )
    .write(
        "build/logs/imp/fast8/summary.json",
        r#"{"em": {"build_result": 0, "test_result": 0}}"#,
    );
    let previous = store.previous_statuses("develop", date(2))?;
    assert_eq!(
        previous.get(&UnitId::base("em"), "test_restraints", "fast8"),
        Some(TestStatus::Fail)
    );
    let second = run_check(&config, &previous)?;
    assert_eq!(second.verdict(), BuildVerdict::Ok);
    store.write(&second.into_record(date(2), "develop"), WriteMode::Clean)?;

    let view = DailyView::new(store.read_day("develop", date(2))?, false);
    assert!(view.is_pass());
    let fixed: Vec<_> = view
        .records()
        .iter()
        .flat_map(|record| &record.tests)
        .filter(|test| test.delta == Some(TestDelta::Newok))
        .map(|test| (test.name.as_str(), test.platform.as_str()))
        .collect();
    assert_eq!(fixed, [("test_restraints", "fast8")]);

    let history = store.test_history("develop", &UnitId::base("em"), "test_restraints", "fast8")?;
    let statuses: Vec<_> = history.iter().map(|(d, t)| (*d, t.status)).collect();
    assert_eq!(
        statuses,
        [(date(1), TestStatus::Fail), (date(2), TestStatus::Ok)]
    );
    assert_eq!(
        store.last_build_with_verdict("develop", date(3), &[BuildVerdict::Test], false)?,
        Some(date(1))
    );
    Ok(())
}

#[test]
fn clean_replaces_and_append_merges() -> Result<()> {
    let tree = BuildTree::new();
    let config = tree.em_build()?;
    let store = open_store(&config);
    let full = run_check(&config, &PreviousStatuses::default())?.into_record(date(5), "develop");

    // A partial rerun that only covers debug8.
    let mut partial = full.clone();
    partial.tests.retain(|test| test.platform == "debug8");
    partial.units.retain(|row| row.platform == "debug8");
    partial.verdict = BuildVerdict::Ok;

    store.write(&full, WriteMode::Clean)?;
    store.write(&partial, WriteMode::Append)?;
    let appended = store.read("develop", date(5), "imp")?.ok_or_eyre("record was stored")?;
    assert_eq!(appended.tests.len(), full.tests.len());
    assert_eq!(appended.units.len(), full.units.len());
    assert_eq!(
        appended.verdict,
        BuildVerdict::Test,
        "appending keeps the worse verdict"
    );

    store.write(&partial, WriteMode::Clean)?;
    let cleaned = store.read("develop", date(5), "imp")?.ok_or_eyre("record was stored")?;
    assert_eq!(cleaned, partial);
    Ok(())
}
