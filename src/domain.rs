use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::KoekenError;

/// Taxonomic rank handed to `summarize_taxa.py -L`. Only 2 (phylum) through
/// 7 (species) are meaningful for Greengenes-style lineages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct TaxonLevel(u8);

impl TaxonLevel {
    pub const MIN: u8 = 2;
    pub const MAX: u8 = 7;

    pub fn new(level: u8) -> Result<Self, KoekenError> {
        if (Self::MIN..=Self::MAX).contains(&level) {
            Ok(Self(level))
        } else {
            Err(KoekenError::InvalidLevel(level.to_string()))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Suffix summarize_taxa.py appends to the input stem, e.g. `_L6`.
    pub fn file_suffix(self) -> String {
        format!("_L{}", self.0)
    }
}

impl Default for TaxonLevel {
    fn default() -> Self {
        Self(6)
    }
}

impl fmt::Display for TaxonLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaxonLevel {
    type Err = KoekenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let level = value
            .trim()
            .parse::<u8>()
            .map_err(|_| KoekenError::InvalidLevel(value.to_string()))?;
        Self::new(level)
    }
}

impl TryFrom<u8> for TaxonLevel {
    type Error = KoekenError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaxonLevel> for u8 {
    fn from(level: TaxonLevel) -> Self {
        level.0
    }
}

/// LEfSe `-y` multiclass strategy: 0 is one-against-all (stricter),
/// 1 is one-against-one (less strict).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum Strictness {
    #[default]
    #[value(name = "0")]
    Strict,
    #[value(name = "1")]
    Lenient,
}

impl Strictness {
    pub fn as_flag(self) -> &'static str {
        match self {
            Strictness::Strict => "0",
            Strictness::Lenient => "1",
        }
    }
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_flag())
    }
}

impl FromStr for Strictness {
    type Err = KoekenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "0" => Ok(Strictness::Strict),
            "1" => Ok(Strictness::Lenient),
            _ => Err(KoekenError::InvalidStrictness(value.to_string())),
        }
    }
}

static UNSAFE_STEM_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("static regex"));

/// A distinct value of the split column together with the file stem used for
/// every artifact derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupName {
    value: String,
    stem: String,
}

impl GroupName {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn file_stem(&self) -> &str {
        &self.stem
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl FromStr for GroupName {
    type Err = KoekenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
            return Err(KoekenError::InvalidGroupName(value.to_string()));
        }
        let stem = UNSAFE_STEM_CHARS.replace_all(trimmed, "_").into_owned();
        Ok(Self {
            value: value.to_string(),
            stem,
        })
    }
}

/// Parses a strictly positive, finite threshold.
pub fn parse_threshold(name: &'static str, value: &str) -> Result<f64, KoekenError> {
    let parsed = value
        .trim()
        .parse::<f64>()
        .map_err(|_| KoekenError::InvalidThreshold {
            name,
            value: value.to_string(),
        })?;
    if !parsed.is_finite() || parsed <= 0.0 {
        return Err(KoekenError::InvalidThreshold {
            name,
            value: value.to_string(),
        });
    }
    Ok(parsed)
}

/// Significance level for the Kruskal-Wallis/Wilcoxon steps, in `(0, 1]`.
pub fn parse_alpha(value: &str) -> Result<f64, KoekenError> {
    let alpha = parse_threshold("p-value", value)?;
    if alpha > 1.0 {
        return Err(KoekenError::InvalidThreshold {
            name: "p-value",
            value: value.to_string(),
        });
    }
    Ok(alpha)
}

/// Cell values pandas' `read_table` reads as missing by default. QIIME
/// mapping files use several of them for unknown metadata.
pub const MISSING_VALUES: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

pub fn is_missing(value: &str) -> bool {
    let trimmed = value.trim();
    MISSING_VALUES.contains(&trimmed)
}

/// Command-line sentinel for "not set", kept for koeken 0.1 scripts.
pub const NOT_SET: &str = "NA";

pub fn optional_value(value: Option<String>) -> Option<String> {
    value.filter(|value| value != NOT_SET)
}
