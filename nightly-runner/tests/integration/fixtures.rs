// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::{Result, WrapErr};
use indoc::{formatdoc, indoc};
use nightly_runner::{
    aggregate::{ProductCheck, ProductResult},
    config::NightlyConfig,
    history::PreviousStatuses,
};

/// A build root in a temporary directory.
pub(crate) struct BuildTree {
    dir: Utf8TempDir,
}

impl BuildTree {
    pub(crate) fn new() -> Self {
        Self {
            dir: Utf8TempDir::new().expect("created temp dir"),
        }
    }

    pub(crate) fn root(&self) -> &Utf8Path {
        self.dir.path()
    }

    /// Writes a file relative to the build root, creating parent directories.
    pub(crate) fn write(&self, path: &str, contents: &str) -> &Self {
        let path = self.root().join(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("created parent dir");
        }
        std::fs::write(&path, contents).expect("wrote file");
        self
    }

    pub(crate) fn config(&self, contents: &str) -> Result<NightlyConfig> {
        self.write(NightlyConfig::CONFIG_PATH, contents);
        NightlyConfig::from_sources(self.root(), None).wrap_err("config loads")
    }

    /// Lays out the `em`/`fast8`/`debug8` build: `em` builds everywhere, and its tests fail on
    /// `fast8` only.
    pub(crate) fn em_build(&self) -> Result<NightlyConfig> {
        self.write("build/imp-version", "2.21.0.r1234\n")
            .write("build/rmf-gitrev", "0123abcd\n")
            .write("build/imp-components", "module\tem\n")
            .write(
                "build/logs/imp/fast8/summary.json",
                r#"{"em": {"build_result": 0, "test_result": 1}}"#,
            )
            .write(
                "build/logs/imp/debug8/summary.json",
                r#"{"em": {"build_result": 0, "test_result": 0}}"#,
            )
            .write("build/logs/imp/fast8/em.test.xml", &em_report("failed"))
            .write("build/logs/imp/debug8/em.test.xml", &em_report("passed"));
        self.config(indoc! {r#"
            [products.imp]
            platforms = ["fast8", "debug8"]

            [[products.imp.structured]]
            platform = "fast8"
            build-types = ["build", "test"]

            [[products.imp.structured]]
            platform = "debug8"
            build-types = ["build", "test"]
        "#})
    }
}

/// A report with a passing `test_maps` and a `test_restraints` with the given status.
pub(crate) fn em_report(restraints_status: &str) -> String {
    formatdoc! {r#"
        <?xml version="1.0" encoding="UTF-8"?>
        <Site BuildName="Linux" Name="build-host">
            <Testing>
                <Test Status="passed">
                    <Name>IMP.em.test_maps</Name>
                    <Results>
                        <NamedMeasurement type="numeric/double" name="Execution Time">
                            <Value>1.25</Value>
                        </NamedMeasurement>
                        <Measurement>
                            <Value>OK</Value>
                        </Measurement>
                    </Results>
                </Test>
                <Test Status="{restraints_status}">
                    <Name>IMP.em.test_restraints</Name>
                    <Results>
                        <NamedMeasurement type="numeric/double" name="Execution Time">
                            <Value>31.5</Value>
                        </NamedMeasurement>
                        <Measurement>
                            <Value>AssertionError: restraint score mismatch</Value>
                        </Measurement>
                    </Results>
                </Test>
            </Testing>
        </Site>
    "#}
}

pub(crate) fn run_check(config: &NightlyConfig, previous: &PreviousStatuses) -> Result<ProductResult> {
    let product = config.product("imp").expect("product imp is configured");
    ProductCheck::new(config, product, previous)
        .run()
        .wrap_err("product check succeeds")
}
