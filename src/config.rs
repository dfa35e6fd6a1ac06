use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{Strictness, TaxonLevel};
use crate::error::KoekenError;
use crate::table::TsvTable;

pub const DEFAULT_SUBJECT_COLUMN: &str = "#SampleID";
pub const DEFAULT_PVALUE: f64 = 0.05;
pub const DEFAULT_EFFECT: f64 = 2.0;
pub const TOOLS_CONFIG_FILE: &str = "koeken.json";

/// Everything one run needs. Built once from the command line and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub map: Utf8PathBuf,
    pub level: TaxonLevel,
    pub class_column: String,
    pub subclass_column: Option<String>,
    pub subject_column: String,
    pub compare: Option<Vec<String>>,
    pub split_column: String,
    pub p_cutoff: f64,
    pub lda_cutoff: f64,
    pub strictness: Strictness,
    pub pretty: bool,
}

impl RunConfig {
    /// Config with the command-line defaults for every optional field.
    pub fn new(
        input: impl Into<Utf8PathBuf>,
        output: impl Into<Utf8PathBuf>,
        map: impl Into<Utf8PathBuf>,
        class_column: impl Into<String>,
        split_column: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            map: map.into(),
            level: TaxonLevel::default(),
            class_column: class_column.into(),
            subclass_column: None,
            subject_column: DEFAULT_SUBJECT_COLUMN.to_string(),
            compare: None,
            split_column: split_column.into(),
            p_cutoff: DEFAULT_PVALUE,
            lda_cutoff: DEFAULT_EFFECT,
            strictness: Strictness::default(),
            pretty: false,
        }
    }

    /// Columns that must be present in the mapping file, in lookup order.
    pub fn required_columns(&self) -> Vec<&str> {
        let mut columns = vec![
            self.subject_column.as_str(),
            self.class_column.as_str(),
            self.split_column.as_str(),
        ];
        if let Some(subclass) = &self.subclass_column {
            columns.push(subclass.as_str());
        }
        columns
    }

    /// Checks the mapping file header before any external tool runs.
    pub fn validate_against_map(&self) -> Result<(), KoekenError> {
        let headers = TsvTable::read_headers(self.map.as_std_path())?;
        for column in self.required_columns() {
            if !headers.iter().any(|header| header == column) {
                return Err(KoekenError::MissingColumn {
                    column: column.to_string(),
                    file: self.map.clone().into_std_path_buf(),
                });
            }
        }
        Ok(())
    }
}

/// Optional overrides for where the external scripts live.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub summarize_taxa: Option<PathBuf>,
    #[serde(default)]
    pub format_input: Option<PathBuf>,
    #[serde(default)]
    pub run_lefse: Option<PathBuf>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads an explicit tools config, or `koeken.json` from the working
    /// directory when present. An absent default file is not an error.
    pub fn resolve(path: Option<&str>) -> Result<ToolsConfig, KoekenError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(TOOLS_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ToolsConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KoekenError::ConfigRead(config_path.clone()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<ToolsConfig, KoekenError> {
        serde_json::from_str(content).map_err(|err| KoekenError::ConfigParse(err.to_string()))
    }
}
