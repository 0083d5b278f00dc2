use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("failed to read label file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("label file {0} contains no labels")]
    Empty(PathBuf),
}

/// Ordinal-indexed class names: row `n` of the label file names class id `n`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Load the first column of every row of a headerless CSV file.
    pub fn load(path: &Path) -> Result<Self, LabelError> {
        let read_err = |source: csv::Error| LabelError::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(read_err)?;

        let mut labels = Vec::new();
        for record in reader.records() {
            let record = record.map_err(read_err)?;
            if let Some(first) = record.get(0) {
                // Label files exported from spreadsheets start with a BOM.
                labels.push(first.trim_start_matches('\u{feff}').trim().to_string());
            }
        }

        if labels.is_empty() {
            return Err(LabelError::Empty(path.to_path_buf()));
        }

        log::info!("loaded {} labels from {}", labels.len(), path.display());
        Ok(Self { labels })
    }

    pub fn get(&self, id: usize) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}
