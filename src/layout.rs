use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{GroupName, TaxonLevel};
use crate::error::KoekenError;

pub const LOG_FILE: &str = "koeken_log.txt";
pub const INPUT_SUFFIX: &str = "_input.txt";
pub const FORMAT_SUFFIX: &str = "_format.txt";
pub const PRETTY_TABLE: &str = "pretty_table.txt";

/// Whether [`OutputLayout::prepare`] found the output root already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RootStatus {
    Created,
    Existing,
}

/// Directory tree owned by one run:
///
/// ```text
/// <output>/
///   summarize_taxa_L<level>/
///   lefse_output/
///     format_lefse/
///     run_lefse/
///     pretty_lefse/      (only with --pretty)
/// ```
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: Utf8PathBuf,
    level: TaxonLevel,
}

impl OutputLayout {
    pub fn new(root: impl Into<Utf8PathBuf>, level: TaxonLevel) -> Self {
        Self {
            root: root.into(),
            level,
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn summarize_dir(&self) -> Utf8PathBuf {
        self.root.join(format!("summarize_taxa_L{}", self.level))
    }

    pub fn lefse_dir(&self) -> Utf8PathBuf {
        self.root.join("lefse_output")
    }

    pub fn format_dir(&self) -> Utf8PathBuf {
        self.lefse_dir().join("format_lefse")
    }

    pub fn run_dir(&self) -> Utf8PathBuf {
        self.lefse_dir().join("run_lefse")
    }

    pub fn pretty_dir(&self) -> Utf8PathBuf {
        self.lefse_dir().join("pretty_lefse")
    }

    pub fn log_path(&self) -> Utf8PathBuf {
        self.root.join(LOG_FILE)
    }

    /// File summarize_taxa.py writes for `input`: its stem plus `_L<level>.txt`.
    pub fn summary_path(&self, input: &Utf8Path) -> Utf8PathBuf {
        let stem = input.file_stem().unwrap_or(input.as_str());
        self.summarize_dir()
            .join(format!("{stem}{}.txt", self.level.file_suffix()))
    }

    pub fn input_path(&self, group: &GroupName) -> Utf8PathBuf {
        self.summarize_dir()
            .join(format!("{}{INPUT_SUFFIX}", group.file_stem()))
    }

    pub fn format_path(&self, group: &GroupName) -> Utf8PathBuf {
        self.format_dir()
            .join(format!("{}{FORMAT_SUFFIX}", group.file_stem()))
    }

    pub fn result_path(&self, group: &GroupName) -> Utf8PathBuf {
        self.run_dir().join(format!("{}.txt", group.file_stem()))
    }

    pub fn pretty_table_path(&self) -> Utf8PathBuf {
        self.pretty_dir().join(PRETTY_TABLE)
    }

    /// Creates every missing directory. Existing directories and their
    /// contents are left untouched.
    pub fn prepare(&self, pretty: bool) -> Result<RootStatus, KoekenError> {
        let status = if self.root.as_std_path().is_dir() {
            RootStatus::Existing
        } else {
            RootStatus::Created
        };

        let mut dirs = vec![
            self.root.clone(),
            self.summarize_dir(),
            self.format_dir(),
            self.run_dir(),
        ];
        if pretty {
            dirs.push(self.pretty_dir());
        }
        for dir in dirs {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| KoekenError::Filesystem(format!("create {dir}: {err}")))?;
        }
        Ok(status)
    }
}
