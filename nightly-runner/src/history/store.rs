// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    BenchmarkRecord, DailyRecord, FormatVersion, RECORD_FORMAT_VERSION, TestRecord, UnitResultRow,
};
use crate::{errors::HistoryStoreError, registry::UnitId};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Days, NaiveDate};
use nightly_metadata::{BuildVerdict, TestStatus};
use serde::Deserialize;
use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io,
};
use tracing::debug;

static RECORD_EXTENSION: &str = "json.zst";

/// How a record is written to a day that may already have one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the day's record for the product. Rerunning a check gives the same result.
    #[default]
    Clean,

    /// Merge rows into the day's existing record for the product.
    Append,
}

/// A directory of daily records, one subdirectory per branch and date.
///
/// Records live at `<dir>/<branch>/<YYYY-MM-DD>/<product>.json.zst`.
#[derive(Clone, Debug)]
pub struct HistoryStore {
    dir: Utf8PathBuf,
    daily_branch: String,
}

impl HistoryStore {
    /// Creates a store rooted at `dir`.
    ///
    /// `daily_branch` is built every day, so its previous build is always yesterday's.
    pub fn new(dir: impl Into<Utf8PathBuf>, daily_branch: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            daily_branch: daily_branch.into(),
        }
    }

    /// Returns the store directory.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Returns the branch built every day.
    pub fn daily_branch(&self) -> &str {
        &self.daily_branch
    }

    fn branch_dir(&self, branch: &str) -> Utf8PathBuf {
        self.dir.join(branch.replace(['/', '.'], "_"))
    }

    fn day_dir(&self, branch: &str, date: NaiveDate) -> Utf8PathBuf {
        self.branch_dir(branch)
            .join(date.format("%Y-%m-%d").to_string())
    }

    /// Returns the path a product's record for a day is stored at.
    pub fn record_path(&self, branch: &str, date: NaiveDate, product: &str) -> Utf8PathBuf {
        self.day_dir(branch, date)
            .join(format!("{product}.{RECORD_EXTENSION}"))
    }

    /// Writes a record.
    pub fn write(&self, record: &DailyRecord, mode: WriteMode) -> Result<(), HistoryStoreError> {
        let day_dir = self.day_dir(&record.branch, record.date);
        std::fs::create_dir_all(&day_dir).map_err(|error| HistoryStoreError::CreateDir {
            path: day_dir.clone(),
            error,
        })?;

        let path = self.record_path(&record.branch, record.date, &record.product);
        let merged;
        let to_write = match mode {
            WriteMode::Clean => record,
            WriteMode::Append => match read_record(&path)? {
                Some(mut existing) => {
                    if existing.product != record.product {
                        return Err(HistoryStoreError::ProductMismatch {
                            date: record.date,
                            stored: existing.product,
                            product: record.product.clone(),
                        });
                    }
                    merge_into(&mut existing, record);
                    merged = existing;
                    &merged
                }
                None => record,
            },
        };

        debug!("writing history record to {path}");
        atomicwrites::AtomicFile::new(&path, atomicwrites::AllowOverwrite)
            .write(|file| {
                let mut encoder = zstd::stream::Encoder::new(file, 3)?;
                serde_json::to_writer_pretty(&mut encoder, to_write)?;
                encoder.finish()?;
                Ok::<_, io::Error>(())
            })
            .map_err(|error| HistoryStoreError::Write { path, error })
    }

    /// Reads one product's record for a day.
    pub fn read(
        &self,
        branch: &str,
        date: NaiveDate,
        product: &str,
    ) -> Result<Option<DailyRecord>, HistoryStoreError> {
        read_record(&self.record_path(branch, date, product))
    }

    /// Reads every product's record for a day, ordered by product.
    pub fn read_day(
        &self,
        branch: &str,
        date: NaiveDate,
    ) -> Result<Vec<DailyRecord>, HistoryStoreError> {
        let day_dir = self.day_dir(branch, date);
        let entries = match day_dir.read_dir_utf8() {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(HistoryStoreError::ListDates {
                    path: day_dir,
                    error,
                });
            }
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|error| HistoryStoreError::ListDates {
                path: day_dir.clone(),
                error,
            })?;
            if entry.file_name().ends_with(RECORD_EXTENSION) {
                paths.push(entry.into_path());
            }
        }
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            records.extend(read_record(&path)?);
        }
        Ok(records)
    }

    /// Returns every date with at least one stored record for a branch, oldest first.
    pub fn dates(&self, branch: &str) -> Result<Vec<NaiveDate>, HistoryStoreError> {
        let branch_dir = self.branch_dir(branch);
        let entries = match branch_dir.read_dir_utf8() {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(HistoryStoreError::ListDates {
                    path: branch_dir,
                    error,
                });
            }
        };

        let mut dates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|error| HistoryStoreError::ListDates {
                path: branch_dir.clone(),
                error,
            })?;
            // Anything that isn't a date-named directory is not ours.
            if let Ok(date) = NaiveDate::parse_from_str(entry.file_name(), "%Y-%m-%d") {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }

    /// Returns the date of the build before `date`.
    ///
    /// The daily branch is assumed to be built every day. For other branches this is the most
    /// recent stored date strictly before `date`.
    pub fn previous_build_date(
        &self,
        branch: &str,
        date: NaiveDate,
    ) -> Result<Option<NaiveDate>, HistoryStoreError> {
        if branch == self.daily_branch {
            return Ok(date.checked_sub_days(Days::new(1)));
        }
        let dates = self.dates(branch)?;
        Ok(dates.into_iter().rev().find(|d| *d < date))
    }

    /// Returns the status of every test in the build before `date`.
    pub fn previous_statuses(
        &self,
        branch: &str,
        date: NaiveDate,
    ) -> Result<PreviousStatuses, HistoryStoreError> {
        let mut statuses = PreviousStatuses::default();
        let Some(previous) = self.previous_build_date(branch, date)? else {
            return Ok(statuses);
        };
        for record in self.read_day(branch, previous)? {
            for test in record.tests {
                statuses.insert(test.unit, test.name, test.platform, test.status);
            }
        }
        Ok(statuses)
    }

    /// Returns the result of one test on one platform for every stored date, oldest first.
    pub fn test_history(
        &self,
        branch: &str,
        unit: &UnitId,
        name: &str,
        platform: &str,
    ) -> Result<Vec<(NaiveDate, TestRecord)>, HistoryStoreError> {
        let mut history = Vec::new();
        for date in self.dates(branch)? {
            for record in self.read_day(branch, date)? {
                history.extend(
                    record
                        .tests
                        .into_iter()
                        .filter(|t| &t.unit == unit && t.name == name && t.platform == platform)
                        .map(|t| (date, t)),
                );
            }
        }
        Ok(history)
    }

    /// Returns every benchmark's measurements over time.
    pub fn benchmark_series(
        &self,
        branch: &str,
    ) -> Result<BTreeMap<BenchmarkKey, Vec<BenchmarkPoint>>, HistoryStoreError> {
        let mut series: BTreeMap<BenchmarkKey, Vec<BenchmarkPoint>> = BTreeMap::new();
        for date in self.dates(branch)? {
            for record in self.read_day(branch, date)? {
                for benchmark in record.benchmarks {
                    let (key, point) = BenchmarkKey::split(benchmark, date);
                    series.entry(key).or_default().push(point);
                }
            }
        }
        Ok(series)
    }

    /// Returns the most recent date before `date` whose verdict is one of `verdicts`.
    ///
    /// Without `lab`, only public products count. With `lab`, a date qualifies only if both the
    /// public and the lab-only verdicts are in `verdicts`.
    pub fn last_build_with_verdict(
        &self,
        branch: &str,
        date: NaiveDate,
        verdicts: &[BuildVerdict],
        lab: bool,
    ) -> Result<Option<NaiveDate>, HistoryStoreError> {
        for candidate in self.dates(branch)?.into_iter().rev() {
            if candidate >= date {
                continue;
            }
            let records = self.read_day(branch, candidate)?;
            let public = worst_verdict(records.iter().filter(|r| !r.lab_only));
            let lab_verdict = worst_verdict(records.iter().filter(|r| r.lab_only));
            let qualifies = match (public, lab) {
                (Some(public), false) => verdicts.contains(&public),
                (Some(public), true) => {
                    verdicts.contains(&public)
                        && lab_verdict.is_some_and(|v| verdicts.contains(&v))
                }
                (None, _) => false,
            };
            if qualifies {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}

fn worst_verdict<'a>(records: impl Iterator<Item = &'a DailyRecord>) -> Option<BuildVerdict> {
    records.map(|r| r.verdict).max()
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RecordHeader {
    format_version: FormatVersion,
}

fn read_record(path: &Utf8Path) -> Result<Option<DailyRecord>, HistoryStoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(HistoryStoreError::Read {
                path: path.to_owned(),
                error,
            });
        }
    };

    let contents = zstd::stream::decode_all(file).map_err(|error| HistoryStoreError::Read {
        path: path.to_owned(),
        error,
    })?;

    // Check the version before the full shape, so newer records give a useful error.
    let header: RecordHeader =
        serde_json::from_slice(&contents).map_err(|error| HistoryStoreError::Deserialize {
            path: path.to_owned(),
            error,
        })?;
    if header.format_version > RECORD_FORMAT_VERSION {
        return Err(HistoryStoreError::UnsupportedFormatVersion {
            path: path.to_owned(),
            found: header.format_version,
            supported: RECORD_FORMAT_VERSION,
        });
    }

    let record =
        serde_json::from_slice(&contents).map_err(|error| HistoryStoreError::Deserialize {
            path: path.to_owned(),
            error,
        })?;
    Ok(Some(record))
}

/// Merges `new` into `existing`. Rows in `new` replace rows in `existing` with the same key.
fn merge_into(existing: &mut DailyRecord, new: &DailyRecord) {
    existing.format_version = RECORD_FORMAT_VERSION;
    existing.verdict = existing.verdict.max(new.verdict);
    if new.revision.is_some() {
        existing.revision.clone_from(&new.revision);
    }
    existing
        .other_revisions
        .extend(new.other_revisions.iter().map(|(k, v)| (k.clone(), v.clone())));
    if !new.build_info.modules.is_empty() {
        existing.build_info.clone_from(&new.build_info);
    }
    for error in &new.log_errors {
        if !existing.log_errors.contains(error) {
            existing.log_errors.push(error.clone());
        }
    }

    merge_rows(&mut existing.units, &new.units, |row: &UnitResultRow| {
        (row.unit.clone(), row.platform.clone())
    });
    merge_rows(&mut existing.tests, &new.tests, |row: &TestRecord| {
        (row.unit.clone(), row.name.clone(), row.platform.clone())
    });
    merge_rows(
        &mut existing.benchmarks,
        &new.benchmarks,
        |row: &BenchmarkRecord| {
            (
                row.unit.clone(),
                row.file.clone(),
                row.name.clone(),
                row.algorithm.clone(),
                row.platform.clone(),
            )
        },
    );
}

fn merge_rows<T: Clone, K: Eq + std::hash::Hash>(
    existing: &mut Vec<T>,
    new: &[T],
    key: impl Fn(&T) -> K,
) {
    let positions: HashMap<K, usize> = existing
        .iter()
        .enumerate()
        .map(|(i, row)| (key(row), i))
        .collect();
    for row in new {
        match positions.get(&key(row)) {
            Some(&i) => existing[i] = row.clone(),
            None => existing.push(row.clone()),
        }
    }
}

/// Test statuses from a previous build, used to compute deltas.
#[derive(Clone, Debug, Default)]
pub struct PreviousStatuses {
    statuses: HashMap<(UnitId, String, String), TestStatus>,
}

impl PreviousStatuses {
    /// Records the status of a test on a platform.
    pub fn insert(
        &mut self,
        unit: UnitId,
        name: impl Into<String>,
        platform: impl Into<String>,
        status: TestStatus,
    ) {
        self.statuses
            .insert((unit, name.into(), platform.into()), status);
    }

    /// Returns the status of a test on a platform, if it ran.
    pub fn get(&self, unit: &UnitId, name: &str, platform: &str) -> Option<TestStatus> {
        self.statuses
            .get(&(unit.clone(), name.to_owned(), platform.to_owned()))
            .copied()
    }

    /// Returns the number of recorded statuses.
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    /// Returns true if nothing ran in the previous build.
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

/// Identifies one benchmark across days.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BenchmarkKey {
    /// The base unit.
    pub unit: String,

    /// The benchmark file.
    pub file: String,

    /// The benchmark name.
    pub name: String,

    /// The algorithm.
    pub algorithm: String,
}

impl BenchmarkKey {
    fn split(record: BenchmarkRecord, date: NaiveDate) -> (Self, BenchmarkPoint) {
        let key = Self {
            unit: record.unit,
            file: record.file,
            name: record.name,
            algorithm: record.algorithm,
        };
        let point = BenchmarkPoint {
            date,
            platform: record.platform,
            runtime: record.runtime,
            check: record.check,
        };
        (key, point)
    }
}

/// One measurement of a benchmark.
#[derive(Clone, Debug, PartialEq)]
pub struct BenchmarkPoint {
    /// The build date.
    pub date: NaiveDate,

    /// The platform.
    pub platform: String,

    /// The runtime in seconds.
    pub runtime: Option<f64>,

    /// The check value.
    pub check: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregate::BuildInfo,
        outcome::{Outcome, UnitState},
    };
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;

    fn date(s: &str) -> NaiveDate {
        s.parse().expect("valid date")
    }

    fn record(branch: &str, day: &str, product: &str, verdict: BuildVerdict) -> DailyRecord {
        DailyRecord {
            format_version: RECORD_FORMAT_VERSION,
            date: date(day),
            branch: branch.to_owned(),
            product: product.to_owned(),
            lab_only: false,
            verdict,
            revision: None,
            other_revisions: BTreeMap::new(),
            build_info: BuildInfo::default(),
            log_errors: Vec::new(),
            units: Vec::new(),
            tests: Vec::new(),
            benchmarks: Vec::new(),
        }
    }

    fn test(name: &str, status: TestStatus) -> TestRecord {
        TestRecord {
            unit: UnitId::base("em"),
            name: name.to_owned(),
            platform: "fast8".to_owned(),
            status,
            runtime: 1.0,
            output: None,
            delta: None,
        }
    }

    #[test]
    fn branch_directories_are_flattened() {
        let store = HistoryStore::new("/store", "develop");
        assert_eq!(
            store.record_path("release/2.20.0", date("2024-03-02"), "imp"),
            "/store/release_2_20_0/2024-03-02/imp.json.zst"
        );
    }

    #[test]
    fn missing_records_are_none() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let store = HistoryStore::new(dir.path(), "develop");
        assert_eq!(store.read("develop", date("2024-03-02"), "imp").unwrap(), None);
        assert!(store.read_day("develop", date("2024-03-02")).unwrap().is_empty());
        assert!(store.dates("develop").unwrap().is_empty());
    }

    #[test]
    fn previous_build_date() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let store = HistoryStore::new(dir.path(), "develop");
        for day in ["2024-03-01", "2024-03-04"] {
            store
                .write(&record("feature/x", day, "imp", BuildVerdict::Ok), WriteMode::Clean)
                .unwrap();
        }

        assert_eq!(
            store
                .previous_build_date("develop", date("2024-03-05"))
                .unwrap(),
            Some(date("2024-03-04"))
        );
        assert_eq!(
            store
                .previous_build_date("feature/x", date("2024-03-04"))
                .unwrap(),
            Some(date("2024-03-01"))
        );
        assert_eq!(
            store
                .previous_build_date("feature/x", date("2024-03-01"))
                .unwrap(),
            None
        );
    }

    #[test]
    fn previous_statuses_come_from_previous_day() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let store = HistoryStore::new(dir.path(), "develop");
        let mut yesterday = record("develop", "2024-03-01", "imp", BuildVerdict::Test);
        yesterday.tests = vec![test("test_a", TestStatus::Fail)];
        store.write(&yesterday, WriteMode::Clean).unwrap();

        let statuses = store
            .previous_statuses("develop", date("2024-03-02"))
            .unwrap();
        assert_eq!(
            statuses.get(&UnitId::base("em"), "test_a", "fast8"),
            Some(TestStatus::Fail)
        );
        assert_eq!(statuses.get(&UnitId::base("em"), "test_a", "debug8"), None);

        let statuses = store
            .previous_statuses("develop", date("2024-03-03"))
            .unwrap();
        assert!(statuses.is_empty());
    }

    #[test]
    fn append_merges_rows() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let store = HistoryStore::new(dir.path(), "develop");

        let mut first = record("develop", "2024-03-02", "imp", BuildVerdict::Ok);
        first.tests = vec![test("test_a", TestStatus::Ok), test("test_b", TestStatus::Ok)];
        first.units = vec![UnitResultRow {
            unit: UnitId::base("em"),
            platform: "fast8".to_owned(),
            state: UnitState {
                outcome: Outcome::Ok,
                structured: true,
            },
            log_line: None,
        }];
        store.write(&first, WriteMode::Clean).unwrap();

        let mut second = record("develop", "2024-03-02", "imp", BuildVerdict::Test);
        second.tests = vec![test("test_b", TestStatus::Fail), test("test_c", TestStatus::Ok)];
        store.write(&second, WriteMode::Append).unwrap();

        let stored = store
            .read("develop", date("2024-03-02"), "imp")
            .unwrap()
            .expect("record exists");
        assert_eq!(stored.verdict, BuildVerdict::Test);
        assert_eq!(stored.units.len(), 1);
        let tests: Vec<_> = stored
            .tests
            .iter()
            .map(|t| (t.name.as_str(), t.status))
            .collect();
        assert_eq!(
            tests,
            [
                ("test_a", TestStatus::Ok),
                ("test_b", TestStatus::Fail),
                ("test_c", TestStatus::Ok),
            ]
        );

        // A clean write replaces everything.
        store.write(&second, WriteMode::Clean).unwrap();
        let stored = store
            .read("develop", date("2024-03-02"), "imp")
            .unwrap()
            .expect("record exists");
        assert_eq!(stored, second);
    }

    #[test]
    fn newer_format_versions_are_rejected() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let store = HistoryStore::new(dir.path(), "develop");
        let mut newer = record("develop", "2024-03-02", "imp", BuildVerdict::Ok);
        newer.format_version = FormatVersion::new(2);
        store.write(&newer, WriteMode::Clean).unwrap();

        let error = store
            .read("develop", date("2024-03-02"), "imp")
            .expect_err("newer version is rejected");
        assert!(
            matches!(error, HistoryStoreError::UnsupportedFormatVersion { .. }),
            "unexpected error: {error}"
        );
    }

    #[test]
    fn last_build_with_verdict() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let store = HistoryStore::new(dir.path(), "develop");

        store
            .write(&record("develop", "2024-03-01", "imp", BuildVerdict::Ok), WriteMode::Clean)
            .unwrap();
        let mut lab = record("develop", "2024-03-01", "imp-lab", BuildVerdict::Build);
        lab.lab_only = true;
        store.write(&lab, WriteMode::Clean).unwrap();
        store
            .write(&record("develop", "2024-03-02", "imp", BuildVerdict::Test), WriteMode::Clean)
            .unwrap();
        let mut lab = record("develop", "2024-03-02", "imp-lab", BuildVerdict::Ok);
        lab.lab_only = true;
        store.write(&lab, WriteMode::Clean).unwrap();
        store
            .write(&record("develop", "2024-03-03", "imp", BuildVerdict::Build), WriteMode::Clean)
            .unwrap();

        let today = date("2024-03-04");
        assert_eq!(
            store
                .last_build_with_verdict("develop", today, &[BuildVerdict::Ok], false)
                .unwrap(),
            Some(date("2024-03-01"))
        );
        assert_eq!(
            store
                .last_build_with_verdict(
                    "develop",
                    today,
                    &[BuildVerdict::Ok, BuildVerdict::Test],
                    true
                )
                .unwrap(),
            Some(date("2024-03-02"))
        );
        assert_eq!(
            store
                .last_build_with_verdict("develop", today, &[BuildVerdict::Ok], true)
                .unwrap(),
            None
        );
    }

    #[test]
    fn benchmark_series_is_grouped_and_ordered() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let store = HistoryStore::new(dir.path(), "develop");
        for (day, runtime) in [("2024-03-02", 2.0), ("2024-03-01", 1.0)] {
            let mut r = record("develop", day, "imp", BuildVerdict::Ok);
            r.benchmarks = vec![BenchmarkRecord {
                unit: "core".to_owned(),
                file: "benchmark_rigid".to_owned(),
                name: "rigid".to_owned(),
                algorithm: "direct".to_owned(),
                platform: "fast8".to_owned(),
                runtime: Some(runtime),
                check: None,
            }];
            store.write(&r, WriteMode::Clean).unwrap();
        }

        let series = store.benchmark_series("develop").unwrap();
        assert_eq!(series.len(), 1);
        let points = series.values().next().expect("one series");
        let runtimes: Vec<_> = points.iter().map(|p| (p.date, p.runtime)).collect();
        assert_eq!(
            runtimes,
            [(date("2024-03-01"), Some(1.0)), (date("2024-03-02"), Some(2.0))]
        );
    }
}
