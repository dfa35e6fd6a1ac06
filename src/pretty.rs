//! Cross-timepoint summary of LEfSe results.
//!
//! Each `run_lefse` result lists every feature with its enriched class and
//! LDA score (blank when not significant). The pretty table lines those up:
//! one row per feature significant anywhere, one column per timepoint, with
//! the LDA score signed by which of the two classes the feature favours.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::domain::GroupName;
use crate::error::KoekenError;
use crate::table::TsvTable;

#[derive(Debug, Clone, PartialEq)]
pub struct LefseRecord {
    pub feature: String,
    pub class: Option<String>,
    pub lda: Option<f64>,
}

impl LefseRecord {
    pub fn is_significant(&self) -> bool {
        self.class.is_some() && self.lda.is_some()
    }
}

pub fn parse_results(path: &Path) -> Result<Vec<LefseRecord>, KoekenError> {
    let content = fs::read_to_string(path)
        .map_err(|err| KoekenError::Filesystem(format!("read {}: {err}", path.display())))?;
    parse_results_str(path, &content)
}

pub fn parse_results_str(path: &Path, content: &str) -> Result<Vec<LefseRecord>, KoekenError> {
    let mut records = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = line.split('\t').collect::<Vec<_>>();
        let malformed = || KoekenError::LefseResult {
            path: path.to_path_buf(),
            line: idx + 1,
        };
        let feature = fields.first().map(|value| value.trim()).unwrap_or_default();
        if feature.is_empty() || fields.len() < 2 {
            return Err(malformed());
        }
        let class = fields
            .get(2)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let lda = match fields.get(3).map(|value| value.trim()) {
            Some(value) if !value.is_empty() => {
                Some(value.parse::<f64>().map_err(|_| malformed())?)
            }
            _ => None,
        };
        records.push(LefseRecord {
            feature: feature.to_string(),
            class,
            lda,
        });
    }
    Ok(records)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrettyTable {
    pub classes: [String; 2],
    pub groups: Vec<String>,
    pub rows: Vec<(String, Vec<f64>)>,
}

impl PrettyTable {
    /// `classes` is the configured allow-list, if any. Without one the two
    /// classes are taken from the enriched classes found in the results.
    pub fn build(
        results: &[(GroupName, Vec<LefseRecord>)],
        classes: Option<&[String]>,
    ) -> Result<Self, KoekenError> {
        let classes = match classes {
            Some(values) => values.to_vec(),
            None => results
                .iter()
                .flat_map(|(_, records)| records.iter())
                .filter_map(|record| record.class.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        };
        let [first, second]: [String; 2] = classes
            .clone()
            .try_into()
            .map_err(|_| KoekenError::PrettyClassCount(classes))?;

        let mut scores = BTreeMap::<String, Vec<f64>>::new();
        for (column, (_, records)) in results.iter().enumerate() {
            for record in records.iter().filter(|record| record.is_significant()) {
                let (Some(class), Some(lda)) = (&record.class, record.lda) else {
                    continue;
                };
                let signed = if *class == first {
                    lda
                } else if *class == second {
                    -lda
                } else {
                    return Err(KoekenError::PrettyClassCount(vec![
                        first.clone(),
                        second.clone(),
                        class.clone(),
                    ]));
                };
                let row = scores
                    .entry(record.feature.clone())
                    .or_insert_with(|| vec![0.0; results.len()]);
                row[column] = signed;
            }
        }

        Ok(Self {
            classes: [first, second],
            groups: results
                .iter()
                .map(|(group, _)| group.as_str().to_string())
                .collect(),
            rows: scores.into_iter().collect(),
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), KoekenError> {
        let mut headers = vec!["Feature".to_string()];
        headers.extend(self.groups.iter().cloned());
        let rows = self
            .rows
            .iter()
            .map(|(feature, values)| {
                let mut row = vec![feature.clone()];
                row.extend(values.iter().map(|value| value.to_string()));
                row
            })
            .collect();
        TsvTable::new(path, headers, rows).write(path)
    }
}
