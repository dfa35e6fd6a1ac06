use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KoekenError {
    #[error("invalid taxonomic level: {0} (expected one of 2, 3, 4, 5, 6, 7)")]
    InvalidLevel(String),

    #[error("invalid strictness: {0} (expected 0 or 1)")]
    InvalidStrictness(String),

    #[error("invalid {name} threshold: {value}")]
    InvalidThreshold { name: &'static str, value: String },

    #[error("column `{column}` not found in {file}")]
    #[diagnostic(help("check the column names in the header row of the mapping file"))]
    MissingColumn { column: String, file: PathBuf },

    #[error("failed to read tools config at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON tools config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to parse table {path}: {message}")]
    Table { path: PathBuf, message: String },

    #[error("required tool not found: {0}")]
    #[diagnostic(help("put it on PATH, in the working directory, or name it in koeken.json"))]
    MissingTool(String),

    #[error("{tool} exited with {status}: {message}")]
    ToolFailed {
        tool: String,
        status: String,
        message: String,
    },

    #[error("summarize_taxa.py did not produce {0}")]
    SummaryMissing(PathBuf),

    #[error("split value {0:?} cannot be used as a file name")]
    InvalidGroupName(String),

    #[error("split values {first:?} and {second:?} both map to file stem {stem}")]
    GroupFileCollision {
        first: String,
        second: String,
        stem: String,
    },

    #[error("malformed LEfSe result line {line} in {path}")]
    LefseResult { path: PathBuf, line: usize },

    #[error("pretty table needs exactly two classes, found {0:?}")]
    PrettyClassCount(Vec<String>),
}
