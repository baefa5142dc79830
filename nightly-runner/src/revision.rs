// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Source revisions recorded by the build.

use crate::{
    errors::RevisionReadError,
    helpers::{BuildLayout, read_first_line, sorted_dir_entries},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, io};
use tracing::warn;

/// The version and revision a product was built from.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildRevision {
    /// The first line of the version stamp, e.g. `2.21.0.r1234`.
    pub long_version: String,

    /// The version, e.g. `2.21.0`, `git` or `SVN`.
    pub version: String,

    /// The revision, e.g. `r1234`, a git hash, or `unknown`.
    pub revision: String,
}

impl BuildRevision {
    /// Derives version and revision from a version stamp and an optional git revision stamp.
    pub fn parse(long_version: &str, gitrev: Option<&str>) -> Self {
        let (version, revision) = match gitrev {
            Some(gitrev) => ("git".to_owned(), gitrev.to_owned()),
            None => match long_version.rsplit_once('.') {
                Some((version, revision)) if revision.starts_with('r') => {
                    (version.to_owned(), revision.to_owned())
                }
                _ if long_version.starts_with('r') => {
                    ("SVN".to_owned(), long_version.to_owned())
                }
                _ => (long_version.to_owned(), "unknown".to_owned()),
            },
        };
        Self {
            long_version: long_version.to_owned(),
            version,
            revision,
        }
    }

    /// Reads the stamps for a repository from a build directory.
    pub fn read(layout: &BuildLayout, repo: &str) -> Result<Self, RevisionReadError> {
        let version_path = layout.version_stamp(repo);
        let long_version = read_first_line(&version_path)
            .map_err(|error| RevisionReadError::new(&version_path, error))?;

        let gitrev_path = layout.gitrev_stamp(repo);
        let gitrev = match read_first_line(&gitrev_path) {
            Ok(gitrev) => Some(gitrev),
            Err(error) if error.kind() == io::ErrorKind::NotFound => None,
            Err(error) => return Err(RevisionReadError::new(&gitrev_path, error)),
        };

        Ok(Self::parse(&long_version, gitrev.as_deref()))
    }
}

/// Reads the stamps of every repository other than `own_repo` in the build directory.
///
/// Returns a map from repository name (the stamp file name up to the first `-`, renamed through
/// `aliases`) to the stamp contents. Git revision stamps take priority over version stamps.
pub fn read_other_revisions(
    layout: &BuildLayout,
    own_repo: &str,
    aliases: &IndexMap<String, String>,
) -> io::Result<BTreeMap<String, String>> {
    let build_dir = layout.build_dir();
    let mut version_stamps = Vec::new();
    let mut gitrev_stamps = Vec::new();
    for (file_name, is_dir) in sorted_dir_entries(&build_dir)? {
        if is_dir {
            continue;
        }
        if file_name.ends_with("-version") {
            version_stamps.push(file_name);
        } else if file_name.ends_with("-gitrev") {
            gitrev_stamps.push(file_name);
        }
    }

    let mut revisions = BTreeMap::new();
    for file_name in version_stamps.into_iter().chain(gitrev_stamps) {
        let Some((repo, _)) = file_name.split_once('-') else {
            continue;
        };
        if repo == own_repo {
            continue;
        }
        let repo = aliases.get(repo).map_or(repo, String::as_str);
        let path = build_dir.join(&file_name);
        match read_first_line(&path) {
            Ok(rev) => {
                revisions.insert(repo.to_owned(), rev);
            }
            Err(error) => warn!("could not read revision stamp {path}: {error}"),
        }
    }
    Ok(revisions)
}
