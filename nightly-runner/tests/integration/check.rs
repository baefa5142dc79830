// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use chrono::NaiveDate;
use color_eyre::eyre::Result;
use indoc::indoc;
use nightly_metadata::{BuildVerdict, TestDelta, TestStatus};
use nightly_runner::{
    aggregate::LogError,
    config::NightlyConfig,
    history::{PreviousStatuses, TestRecord},
    outcome::{Outcome, Phase, UnitState},
    registry::{SubKind, UnitId},
};
use pretty_assertions::assert_eq;

fn find<'a>(tests: &'a [TestRecord], name: &str, platform: &str) -> &'a TestRecord {
    tests
        .iter()
        .find(|test| test.name == name && test.platform == platform)
        .unwrap_or_else(|| panic!("test {name} on {platform} was recorded"))
}

#[test]
fn em_fast8_debug8() -> Result<()> {
    let tree = BuildTree::new();
    let config = tree.em_build()?;
    let result = run_check(&config, &PreviousStatuses::default())?;

    let em = UnitId::base("em");
    let outcome = |platform| result.matrix().get(&em, platform).map(|cell| cell.outcome);
    assert_eq!(outcome("fast8"), Some(Outcome::TestFailed));
    assert_eq!(outcome("debug8"), Some(Outcome::Ok));
    assert_eq!(
        result
            .matrix()
            .get(&em.with_sub_kind(SubKind::Examples), "fast8")
            .map(|cell| cell.outcome),
        Some(Outcome::Excluded),
        "platforms without an example build type exclude the examples sub-unit"
    );
    assert_eq!(result.verdict(), BuildVerdict::Test);
    assert!(result.log_errors().is_empty());
    assert_eq!(
        result.revision().map(|revision| revision.long_version.as_str()),
        Some("2.21.0.r1234")
    );

    assert_eq!(result.tests().len(), 4);
    let failed = find(result.tests(), "test_restraints", "fast8");
    assert_eq!(failed.status, TestStatus::Fail);
    assert_eq!(failed.runtime, 31.5);
    assert_eq!(
        failed.output.as_deref(),
        Some("AssertionError: restraint score mismatch")
    );
    assert_eq!(failed.delta, None, "no previous build means no delta");
    let passed = find(result.tests(), "test_maps", "debug8");
    assert_eq!(passed.status, TestStatus::Ok);
    assert_eq!(passed.output, None);

    let report = result.text_report(&config);
    assert!(report.starts_with("imp OK\n"), "report: {report}");
    assert!(report.contains("Fast"), "failing platform is shown: {report}");
    assert!(!report.contains("Dbg"), "passing platform is hidden: {report}");

    let date = NaiveDate::from_ymd_opt(2024, 3, 2).expect("valid date");
    let record = result.into_record(date, "develop");
    assert_eq!(record.product, "imp");
    assert_eq!(record.verdict, BuildVerdict::Test);
    assert_eq!(
        record.other_revisions.get("rmf").map(String::as_str),
        Some("0123abcd")
    );
    let row = record
        .units
        .iter()
        .find(|row| row.unit == em && row.platform == "fast8")
        .expect("em on fast8 has a row");
    assert_eq!(
        row.state,
        UnitState {
            outcome: Outcome::TestFailed,
            structured: true,
        }
    );
    assert_eq!(row.state.to_string(), "CMAKE_TEST");
    Ok(())
}

#[test]
fn deltas_against_previous_build() -> Result<()> {
    let tree = BuildTree::new();
    let config = tree.em_build()?;
    let em = UnitId::base("em");
    let mut previous = PreviousStatuses::default();
    previous.insert(em.clone(), "test_restraints", "fast8", TestStatus::Ok);
    previous.insert(em.clone(), "test_restraints", "debug8", TestStatus::Fail);
    previous.insert(em, "test_maps", "debug8", TestStatus::Skip);

    let result = run_check(&config, &previous)?;
    let tests = result.tests();
    assert_eq!(
        find(tests, "test_restraints", "fast8").delta,
        Some(TestDelta::Newfail)
    );
    assert_eq!(
        find(tests, "test_restraints", "debug8").delta,
        Some(TestDelta::Newok)
    );
    assert_eq!(find(tests, "test_maps", "debug8").delta, None);
    assert_eq!(find(tests, "test_maps", "fast8").delta, None);
    Ok(())
}

#[test]
fn unknown_and_malformed_reports_are_skipped() -> Result<()> {
    let tree = BuildTree::new();
    let config = tree.em_build()?;
    tree.write("build/logs/imp/fast8/foxs.test.xml", &em_report("passed"))
        .write("build/logs/imp/debug8/em.example.xml", "<Site><Test Status=")
        .write("build/logs/imp/fast8/notes.txt", "not a report");

    let result = run_check(&config, &PreviousStatuses::default())?;
    assert_eq!(result.tests().len(), 4);
    assert!(
        result
            .tests()
            .iter()
            .all(|test| test.unit == UnitId::base("em"))
    );
    Ok(())
}

#[test]
fn benchmarks_on_fast_platforms() -> Result<()> {
    let tree = BuildTree::new();
    let config = tree.em_build()?;
    let benchmark = indoc! {r#"
        <Site>
            <Test Status="passed">
                <Name>IMP.em.benchmark_fft</Name>
                <Results>
                    <Measurement>
                        <Value>fft, fftw, 0.5, 1.0, 0
        fft, naive, 2.25, 1.0, 0
        summary line
        </Value>
                    </Measurement>
                </Results>
            </Test>
        </Site>
    "#};
    tree.write("build/logs/imp/fast8/em.benchmark.xml", benchmark)
        .write("build/logs/imp/debug8/em.benchmark.xml", benchmark);

    let result = run_check(&config, &PreviousStatuses::default())?;
    let benchmarks = result.benchmarks();
    assert_eq!(benchmarks.len(), 2, "only fast8 records benchmarks");
    assert!(benchmarks.iter().all(|b| b.unit == "em" && b.platform == "fast8"));
    assert_eq!(benchmarks[0].file, "benchmark_fft");
    assert_eq!(benchmarks[1].algorithm, "naive");
    assert_eq!(benchmarks[1].runtime, Some(2.25));

    let bench_tests: Vec<_> = result
        .tests()
        .iter()
        .filter(|test| test.unit.sub_kind == SubKind::Benchmarks)
        .collect();
    assert_eq!(bench_tests.len(), 2, "benchmark reports are recorded as tests too");
    Ok(())
}

#[test]
fn application_benchmarks_use_the_base_unit() -> Result<()> {
    let tree = BuildTree::new();
    let config = tree.em_build()?;
    let benchmark = indoc! {r#"
        <Site>
            <Test Status="passed">
                <Name>IMP.foxs.benchmark_profile</Name>
                <Results>
                    <Measurement>
                        <Value>profile, fast, 1.5, 2.0, x</Value>
                    </Measurement>
                </Results>
            </Test>
        </Site>
    "#};
    tree.write("build/imp-components", "module\tem\napplication\tfoxs\n")
        .write("build/logs/imp/fast8/foxs.benchmark.xml", benchmark)
        .write("build/logs/imp/debug8/foxs.benchmark.xml", benchmark);

    let result = run_check(&config, &PreviousStatuses::default())?;
    let benchmarks = result.benchmarks();
    assert_eq!(benchmarks.len(), 1, "only fast8 records benchmarks");
    assert_eq!(benchmarks[0].unit, "foxs");
    assert_eq!(benchmarks[0].file, "benchmark_profile");
    assert_eq!(benchmarks[0].algorithm, "fast");
    assert_eq!(benchmarks[0].runtime, Some(1.5));
    assert_eq!(benchmarks[0].check, Some(2.0));
    assert!(
        result
            .tests()
            .iter()
            .all(|test| test.unit == UnitId::base("em")),
        "applications have no benchmarks sub-unit to record tests against"
    );
    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn non_utf8_file_names_are_skipped() -> Result<()> {
    use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

    let tree = BuildTree::new();
    let config = tree.em_build()?;
    let platform_dir = tree.root().join("build/logs/imp/fast8");
    std::fs::write(
        platform_dir
            .as_std_path()
            .join(OsStr::from_bytes(b"stray-\xff.txt")),
        "",
    )?;

    let result = run_check(&config, &PreviousStatuses::default())?;
    assert_eq!(result.tests().len(), 4);
    assert_eq!(result.verdict(), BuildVerdict::Test);
    Ok(())
}

fn direct_log_build(tree: &BuildTree, log: &str) -> Result<NightlyConfig> {
    tree.write("build/imp-version", "2.21.0.r1234\n")
        .write("build/imp-components", "module\tem\nmodule\tkernel\n")
        .write("build/logs/imp/bin.mac14-intel.log", log)
        .write("build/logs/imp/package.log", "packaging\n");
    tree.config(indoc! {r#"
        [products.imp]
        platforms = ["mac14-intel"]

        [[products.imp.logs]]
        name = "package.log"
        description = "RPM package"
        generated-files = ["packages/imp-{version}.rpm"]
    "#})
}

#[test]
fn direct_log_platform() -> Result<()> {
    let tree = BuildTree::new();
    let config = direct_log_build(
        &tree,
        indoc! {"
            building
            %%% em: OK
            %%% kernel: TEST
            BUILD COMPLETED
        "},
    )?;
    tree.write("packages/imp-2.21.0.r1234.rpm", "");

    let result = run_check(&config, &PreviousStatuses::default())?;
    let kernel = result
        .matrix()
        .get(&UnitId::base("kernel"), "mac14-intel")
        .expect("kernel has a cell");
    assert_eq!(kernel.outcome, Outcome::TestFailed);
    assert_eq!(kernel.log_line, Some(3));
    assert!(result.log_errors().is_empty());
    assert_eq!(result.verdict(), BuildVerdict::Test);
    Ok(())
}

#[test]
fn incomplete_direct_log() -> Result<()> {
    let tree = BuildTree::new();
    let config = direct_log_build(&tree, "%%% em: OK\n")?;
    tree.write("packages/imp-2.21.0.r1234.rpm", "");

    let result = run_check(&config, &PreviousStatuses::default())?;
    assert_eq!(
        result
            .matrix()
            .get(&UnitId::base("kernel"), "mac14-intel")
            .map(|cell| cell.outcome),
        Some(Outcome::Running(Phase::Build))
    );
    assert_eq!(result.verdict(), BuildVerdict::Incomplete);
    Ok(())
}

#[test]
fn missing_output_fails_the_build() -> Result<()> {
    let tree = BuildTree::new();
    let config = direct_log_build(&tree, "%%% em: OK\n%%% kernel: OK\nBUILD COMPLETED\n")?;

    let result = run_check(&config, &PreviousStatuses::default())?;
    assert_eq!(
        result.log_errors(),
        [LogError::MissingOutput {
            output: "packages/imp-2.21.0.r1234.rpm".to_owned(),
            description: "RPM package".to_owned(),
            log: Some("imp/package.log".to_owned()),
        }]
    );
    assert_eq!(result.verdict(), BuildVerdict::Build);
    assert!(
        result.text_report(&config).starts_with(indoc! {"
            imp FAILED
              RPM package: output packages/imp-2.21.0.r1234.rpm not generated; see log imp/package.log
        "}),
    );
    Ok(())
}

#[test]
fn missing_and_extra_logs_are_bad_logs() -> Result<()> {
    let tree = BuildTree::new();
    let config = direct_log_build(&tree, "%%% em: OK\n%%% kernel: OK\nBUILD COMPLETED\n")?;
    tree.write("packages/imp-2.21.0.r1234.rpm", "")
        .write("build/logs/imp/stray.log", "");
    std::fs::remove_file(tree.root().join("build/logs/imp/bin.mac14-intel.log"))?;

    let result = run_check(&config, &PreviousStatuses::default())?;
    assert_eq!(
        result.log_errors(),
        [
            LogError::MissingLog {
                log: "imp/bin.mac14-intel.log".to_owned(),
                description: "Debug build (64-bit Intel Mac; MacOS 14 (Sonoma); clang++; Python 3)"
                    .to_owned(),
            },
            LogError::ExtraLog {
                log: "imp/stray.log".to_owned(),
            },
        ]
    );
    assert_eq!(
        result
            .matrix()
            .get(&UnitId::base("em"), "mac14-intel")
            .map(|cell| cell.outcome),
        Some(Outcome::NoLog)
    );
    assert_eq!(result.verdict(), BuildVerdict::BadLog);
    Ok(())
}
