use std::collections::{BTreeMap, HashMap};

use camino::Utf8PathBuf;

use crate::config::RunConfig;
use crate::domain::{self, GroupName};
use crate::error::KoekenError;
use crate::layout::OutputLayout;
use crate::table::TsvTable;

/// Rows of the summarized table sharing one split value, already projected to
/// subject, class, optional subclass and the taxon columns.
#[derive(Debug, Clone)]
pub struct Partition {
    pub group: GroupName,
    pub table: TsvTable,
}

#[derive(Debug, Clone, Default)]
pub struct SplitOutcome {
    pub partitions: Vec<Partition>,
    /// Rows removed because their class is not in the allow-list.
    pub filtered_out: usize,
    /// Rows whose split value is empty or a missing marker such as `NA`;
    /// they belong to no partition.
    pub unlabelled: usize,
}

pub struct TableSplitter<'a> {
    config: &'a RunConfig,
}

impl<'a> TableSplitter<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self { config }
    }

    /// Column positions to keep, in output order. Taxon columns are every
    /// column at or past the mapping file's width, since summarize_taxa.py
    /// appends them after the mapping columns.
    pub fn kept_columns(
        &self,
        summary: &TsvTable,
        map_width: usize,
    ) -> Result<Vec<usize>, KoekenError> {
        let mut columns = vec![
            summary.column_index(&self.config.subject_column)?,
            summary.column_index(&self.config.class_column)?,
        ];
        if let Some(subclass) = &self.config.subclass_column {
            columns.push(summary.column_index(subclass)?);
        }
        if map_width >= summary.width() {
            return Err(KoekenError::Table {
                path: summary.path().to_path_buf(),
                message: format!("no taxon columns after the {map_width} mapping columns"),
            });
        }
        columns.extend(map_width..summary.width());
        Ok(columns)
    }

    pub fn split(
        &self,
        summary: &TsvTable,
        map_width: usize,
    ) -> Result<SplitOutcome, KoekenError> {
        let columns = self.kept_columns(summary, map_width)?;
        let class_idx = summary.column_index(&self.config.class_column)?;
        let split_idx = summary.column_index(&self.config.split_column)?;

        let allowed = |row: &[String]| match &self.config.compare {
            Some(values) => values.iter().any(|value| value == &row[class_idx]),
            None => true,
        };

        let mut filtered_out = 0;
        let mut unlabelled = 0;
        let mut groups = BTreeMap::<&str, usize>::new();
        for row in summary.rows() {
            if !allowed(row) {
                filtered_out += 1;
                continue;
            }
            let value = row[split_idx].as_str();
            if domain::is_missing(value) {
                unlabelled += 1;
                continue;
            }
            *groups.entry(value).or_default() += 1;
        }

        let mut stems = HashMap::<String, String>::new();
        let mut partitions = Vec::with_capacity(groups.len());
        for value in groups.keys() {
            let group: GroupName = value.parse()?;
            if let Some(first) = stems.insert(group.file_stem().to_string(), value.to_string()) {
                return Err(KoekenError::GroupFileCollision {
                    first,
                    second: value.to_string(),
                    stem: group.file_stem().to_string(),
                });
            }
            let table = summary.project(&columns, |row| allowed(row) && row[split_idx] == *value);
            partitions.push(Partition { group, table });
        }

        Ok(SplitOutcome {
            partitions,
            filtered_out,
            unlabelled,
        })
    }
}

impl Partition {
    /// Writes `<group>_input.txt` into the summarization directory.
    pub fn write_input(&self, layout: &OutputLayout) -> Result<Utf8PathBuf, KoekenError> {
        let path = layout.input_path(&self.group);
        self.table.write(path.as_std_path())?;
        Ok(path)
    }
}
