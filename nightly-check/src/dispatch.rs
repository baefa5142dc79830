// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError, Result,
    output::{OutputContext, OutputOpts, StdoutStyles},
};
use camino::Utf8PathBuf;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use nightly_metadata::BuildVerdict;
use nightly_runner::{
    aggregate::ProductCheck,
    config::{NightlyConfig, ProductConfig},
    history::{DailyView, HistoryStore, TestRecord, WriteMode},
    reconcile::scan_build_problems,
    registry::UnitId,
};
use owo_colors::OwoColorize;
use std::io::Write;
use swrite::{SWrite, swrite};
use tracing::{debug, info, warn};

/// Reconciles a nightly build's per-platform results and records them to history.
#[derive(Debug, Parser)]
#[command(
    version,
    styles = crate::output::clap_styles::style(),
    max_term_width = 100
)]
pub struct NightlyCheckApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(subcommand)]
    command: Command,
}

impl NightlyCheckApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, writing reports to `stdout`.
    ///
    /// Returns the exit code.
    pub fn exec(self, output: OutputContext, stdout: &mut dyn Write) -> Result<i32> {
        let styles = output.stdout_styles();
        match self.command {
            Command::Check(opts) => opts.exec(&styles, stdout),
            Command::Verdict(opts) => opts.exec(&styles, stdout),
            Command::Status(opts) => opts.exec(stdout),
            Command::History(opts) => opts.exec(&styles, stdout),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check a build directory and record its results
    Check(CheckOpts),

    /// Print the recorded verdict for a day
    ///
    /// Exits with 0 if the verdict is OK or TEST.
    Verdict(VerdictOpts),

    /// List units that are still building or have failed in a live build directory
    ///
    /// Nothing is written to history.
    Status(StatusOpts),

    /// Query recorded history
    History(HistoryOpts),
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Config options")]
struct ConfigOpts {
    /// Build root directory
    #[arg(long, value_name = "DIR", env = "NIGHTLY_ROOT")]
    root: Utf8PathBuf,

    /// Config file [default: <root>/.config/nightly.toml]
    #[arg(long, value_name = "PATH")]
    config: Option<Utf8PathBuf>,

    /// Only look at this product (may be specified multiple times)
    #[arg(long = "product", value_name = "NAME")]
    products: Vec<String>,
}

impl ConfigOpts {
    fn load(&self) -> Result<NightlyConfig> {
        Ok(NightlyConfig::from_sources(
            self.root.clone(),
            self.config.as_deref(),
        )?)
    }

    fn select<'a>(&self, config: &'a NightlyConfig) -> Result<Vec<&'a ProductConfig>> {
        if self.products.is_empty() {
            if config.products().is_empty() {
                warn!("no products configured");
            }
            return Ok(config.products().iter().collect());
        }
        self.products
            .iter()
            .map(|name| {
                config
                    .product(name)
                    .ok_or_else(|| ExpectedError::UnknownProduct {
                        product: name.clone(),
                    })
            })
            .collect()
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "History options")]
struct StoreOpts {
    /// History store directory [default: from config]
    #[arg(long, value_name = "DIR")]
    store: Option<Utf8PathBuf>,

    /// Branch that was built [default: the daily branch from config]
    #[arg(long, value_name = "BRANCH")]
    branch: Option<String>,

    /// Build date, as YYYY-MM-DD [default: today]
    #[arg(long, value_name = "DATE")]
    date: Option<NaiveDate>,
}

impl StoreOpts {
    fn open(&self, config: &NightlyConfig) -> HistoryStore {
        let dir = self
            .store
            .clone()
            .unwrap_or_else(|| config.store().dir().to_owned());
        HistoryStore::new(dir, config.store().daily_branch())
    }

    fn branch<'a>(&'a self, config: &'a NightlyConfig) -> &'a str {
        self.branch
            .as_deref()
            .unwrap_or_else(|| config.store().daily_branch())
    }

    fn date(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Local::now().date_naive())
    }
}

#[derive(Debug, Args)]
struct CheckOpts {
    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(flatten)]
    store_opts: StoreOpts,

    /// Print results without writing history
    #[arg(long)]
    dry_run: bool,

    /// Merge results into the day's existing records instead of replacing them
    #[arg(long)]
    append: bool,
}

impl CheckOpts {
    fn exec(self, styles: &StdoutStyles, stdout: &mut dyn Write) -> Result<i32> {
        let config = self.config_opts.load()?;
        let products = self.config_opts.select(&config)?;
        let store = self.store_opts.open(&config);
        let branch = self.store_opts.branch(&config);
        let date = self.store_opts.date();
        let mode = if self.append {
            WriteMode::Append
        } else {
            WriteMode::Clean
        };

        let previous = store.previous_statuses(branch, date)?;
        debug!("{} test statuses from the previous build", previous.len());
        info!("checking {} products on {branch} for {date}", products.len());

        let mut verdict = BuildVerdict::Ok;
        for product in products {
            let result = ProductCheck::new(&config, product, &previous).run()?;
            write!(stdout, "{}", result.text_report(&config))
                .map_err(ExpectedError::write_output)?;
            verdict = verdict.max(result.verdict());

            if self.dry_run {
                debug!("dry run: not recording {}", product.name());
                continue;
            }
            store.write(&result.into_record(date, branch), mode)?;
        }

        writeln!(stdout, "verdict: {}", styled_verdict(verdict, styles))
            .map_err(ExpectedError::write_output)?;
        Ok(verdict.exit_code())
    }
}

#[derive(Debug, Args)]
struct VerdictOpts {
    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(flatten)]
    store_opts: StoreOpts,

    /// Include lab-only products
    #[arg(long)]
    lab_only: bool,
}

impl VerdictOpts {
    fn exec(self, styles: &StdoutStyles, stdout: &mut dyn Write) -> Result<i32> {
        let config = self.config_opts.load()?;
        let store = self.store_opts.open(&config);
        let branch = self.store_opts.branch(&config);
        let date = self.store_opts.date();

        let view = DailyView::new(store.read_day(branch, date)?, self.lab_only);
        let Some(verdict) = view.verdict() else {
            return Err(ExpectedError::NoHistory {
                branch: branch.to_owned(),
                date,
            });
        };
        writeln!(stdout, "{}", styled_verdict(verdict, styles))
            .map_err(ExpectedError::write_output)?;
        Ok(verdict.exit_code())
    }
}

#[derive(Debug, Args)]
struct StatusOpts {
    #[clap(flatten)]
    config_opts: ConfigOpts,
}

impl StatusOpts {
    fn exec(self, stdout: &mut dyn Write) -> Result<i32> {
        let config = self.config_opts.load()?;
        for product in self.config_opts.select(&config)? {
            let layout = product.layout(config.root());
            for problem in scan_build_problems(&layout.product_log_dir(product.dir()))? {
                writeln!(stdout, "{problem}").map_err(ExpectedError::write_output)?;
            }
        }
        Ok(0)
    }
}

#[derive(Debug, Args)]
struct HistoryOpts {
    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(flatten)]
    store_opts: StoreOpts,

    /// Include lab-only products
    #[arg(long, global = true)]
    lab_only: bool,

    #[clap(subcommand)]
    command: HistoryCommand,
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    /// List failed tests
    Failures {
        /// Only list tests that passed in the previous build
        #[arg(long)]
        new: bool,
    },

    /// List tests that took longer than 20 seconds, slowest first
    LongTests,

    /// Show the unit by platform grid for units and platforms with failures
    Summary,

    /// Show one test's results on one platform over time
    TestHistory {
        /// The unit, with a sub-unit suffix if any (e.g. "em examples")
        #[arg(long)]
        unit: String,

        /// The test name
        #[arg(long)]
        name: String,

        /// The platform
        #[arg(long)]
        platform: String,
    },
}

impl HistoryOpts {
    fn exec(self, styles: &StdoutStyles, stdout: &mut dyn Write) -> Result<i32> {
        let config = self.config_opts.load()?;
        let store = self.store_opts.open(&config);
        let branch = self.store_opts.branch(&config);
        let date = self.store_opts.date();
        let daily_view = || -> Result<DailyView> {
            let view = DailyView::new(store.read_day(branch, date)?, self.lab_only);
            if view.records().is_empty() {
                return Err(ExpectedError::NoHistory {
                    branch: branch.to_owned(),
                    date,
                });
            }
            Ok(view)
        };

        let mut out = String::new();
        match &self.command {
            HistoryCommand::Failures { new } => {
                let view = daily_view()?;
                let tests = if *new {
                    view.new_failures()
                } else {
                    view.failed_tests()
                };
                for test in tests {
                    swrite!(
                        out,
                        "{} {}: {} {}",
                        test.unit,
                        test.platform,
                        test.name,
                        styled_status(test, styles)
                    );
                    write_delta(&mut out, test);
                    out.push('\n');
                }
            }
            HistoryCommand::LongTests => {
                for test in daily_view()?.long_tests() {
                    swrite!(
                        out,
                        "{:>8.1}s {} {}: {}\n",
                        test.runtime,
                        test.unit,
                        test.platform,
                        test.name
                    );
                }
            }
            HistoryCommand::Summary => {
                write_summary(&mut out, &daily_view()?, &config, styles);
            }
            HistoryCommand::TestHistory {
                unit,
                name,
                platform,
            } => {
                let unit = UnitId::parse_display(unit);
                for (date, test) in store.test_history(branch, &unit, name, platform)? {
                    swrite!(out, "{date} {}", styled_status(&test, styles));
                    write_delta(&mut out, &test);
                    swrite!(out, " {:.2}s\n", test.runtime);
                }
            }
        }

        stdout
            .write_all(out.as_bytes())
            .map_err(ExpectedError::write_output)?;
        Ok(0)
    }
}

fn write_summary(
    out: &mut String,
    view: &DailyView,
    config: &NightlyConfig,
    styles: &StdoutStyles,
) {
    let summary = view.unit_summary(config.platforms()).failures_only();
    swrite!(out, "{:24}", "");
    for platform in summary.platforms() {
        swrite!(out, " {:<12}", config.platforms().very_short(platform));
    }
    out.push('\n');

    for unit in summary.units() {
        let unit_name: String = unit.to_string().chars().take(24).collect();
        swrite!(out, "{unit_name:<24}");
        for platform in summary.platforms() {
            let cell = match summary.get(unit, platform) {
                Some(cell) if cell.failures > 0 => format!(
                    "{}({})",
                    cell.state.outcome.display_bucket().as_str(),
                    cell.failures
                ),
                Some(cell) => cell.state.outcome.display_bucket().as_str().to_owned(),
                None => "-".to_owned(),
            };
            if summary.is_failure(unit, platform) {
                swrite!(out, " {:<12}", cell.style(styles.fail));
            } else {
                swrite!(out, " {cell:<12}");
            }
        }
        out.push('\n');
    }
}

fn write_delta(out: &mut String, test: &TestRecord) {
    if let Some(delta) = test.delta {
        swrite!(out, " ({delta})");
    }
}

fn styled_status(test: &TestRecord, styles: &StdoutStyles) -> String {
    let style = if test.status.is_ok_like() {
        styles.pass
    } else {
        styles.fail
    };
    test.status.style(style).to_string()
}

fn styled_verdict(verdict: BuildVerdict, styles: &StdoutStyles) -> String {
    let style = if verdict.is_pass() {
        styles.pass
    } else {
        styles.fail
    };
    verdict.style(style).to_string()
}
