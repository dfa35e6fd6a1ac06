use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};

use crate::error::KoekenError;

/// Tab-separated table keyed by its header row. Cells are kept as the exact
/// strings read from disk so rewritten subsets are byte-stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsvTable {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TsvTable {
    pub fn new(path: impl Into<PathBuf>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            path: path.into(),
            headers,
            rows,
        }
    }

    pub fn read(path: &Path) -> Result<Self, KoekenError> {
        let file = File::open(path)
            .map_err(|err| KoekenError::Filesystem(format!("open {}: {err}", path.display())))?;
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let headers = reader
            .headers()
            .map_err(|err| table_error(path, err))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| table_error(path, err))?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            let mut row = record.iter().map(str::to_string).collect::<Vec<_>>();
            if row.len() > headers.len() {
                return Err(KoekenError::Table {
                    path: path.to_path_buf(),
                    message: format!(
                        "row {} has {} fields, header has {}",
                        rows.len() + 2,
                        row.len(),
                        headers.len()
                    ),
                });
            }
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
        })
    }

    /// Reads only the header row.
    pub fn read_headers(path: &Path) -> Result<Vec<String>, KoekenError> {
        let file = File::open(path)
            .map_err(|err| KoekenError::Filesystem(format!("open {}: {err}", path.display())))?;
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .from_reader(file);
        let headers = reader.headers().map_err(|err| table_error(path, err))?;
        Ok(headers.iter().map(str::to_string).collect())
    }

    pub fn write(&self, path: &Path) -> Result<(), KoekenError> {
        let mut writer = WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)
            .map_err(|err| table_error(path, err))?;
        writer
            .write_record(&self.headers)
            .map_err(|err| table_error(path, err))?;
        for row in &self.rows {
            writer.write_record(row).map_err(|err| table_error(path, err))?;
        }
        writer
            .flush()
            .map_err(|err| KoekenError::Filesystem(format!("write {}: {err}", path.display())))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, KoekenError> {
        self.headers
            .iter()
            .position(|header| header == name)
            .ok_or_else(|| KoekenError::MissingColumn {
                column: name.to_string(),
                file: self.path.clone(),
            })
    }

    /// Copies the given columns, in the given order, from every row for which
    /// `keep` returns true.
    pub fn project<F>(&self, columns: &[usize], mut keep: F) -> TsvTable
    where
        F: FnMut(&[String]) -> bool,
    {
        let headers = columns
            .iter()
            .map(|&idx| self.headers[idx].clone())
            .collect();
        let rows = self
            .rows
            .iter()
            .filter(|row| keep(row))
            .map(|row| columns.iter().map(|&idx| row[idx].clone()).collect())
            .collect();
        TsvTable {
            path: self.path.clone(),
            headers,
            rows,
        }
    }
}

fn table_error(path: &Path, err: csv::Error) -> KoekenError {
    KoekenError::Table {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
