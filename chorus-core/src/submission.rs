//! Submission table assembly and emission.
//!
//! The output table must contain every expected `row_id` exactly once with a
//! full probability vector per row. Reconciliation against the expected row
//! set happens before anything is written: missing rows are filled with the
//! default probability and logged, duplicates and malformed rows are fatal.
//! Silent partial output is never acceptable.

use crate::error::{Result, SchemaError, SubmissionError};
use crate::infer::{row_id, soundscape_id, PredictionRow, DEFAULT_PROBABILITY};
use crate::taxonomy::Taxonomy;
use crate::window::WindowConfig;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Decimal places used for probability columns.
const PROBABILITY_DECIMALS: usize = 4;

/// An assembled submission table with a fixed species column order.
pub struct SubmissionTable {
    species: Vec<String>,
    rows: Vec<PredictionRow>,
}

impl SubmissionTable {
    pub fn new(species: Vec<String>, rows: Vec<PredictionRow>) -> Self {
        Self { species, rows }
    }

    pub fn rows(&self) -> &[PredictionRow] {
        &self.rows
    }

    /// Reconcile produced rows against the expected row-id set.
    ///
    /// Reorders rows to the expected order. Missing rows are filled with the
    /// default probability vector and logged; duplicate row ids are a fatal
    /// [`SubmissionError`].
    pub fn reconcile(&mut self, expected: &[String]) -> Result<()> {
        let mut by_id: HashMap<String, PredictionRow> =
            HashMap::with_capacity(self.rows.len());
        for row in self.rows.drain(..) {
            let id = row.row_id.clone();
            if by_id.insert(id.clone(), row).is_some() {
                return Err(SubmissionError::DuplicateRow(id).into());
            }
        }

        let mut reconciled = Vec::with_capacity(expected.len());
        let mut filled = 0usize;
        for id in expected {
            match by_id.remove(id) {
                Some(row) => reconciled.push(row),
                None => {
                    filled += 1;
                    warn!(row_id = %id, "missing prediction row, filling with default");
                    reconciled.push(PredictionRow {
                        row_id: id.clone(),
                        probabilities: vec![DEFAULT_PROBABILITY; self.species.len()],
                    });
                }
            }
        }

        for leftover in by_id.keys() {
            warn!(row_id = %leftover, "dropping row not in expected set");
        }

        if filled > 0 {
            warn!(filled, "filled missing rows with default probabilities");
        }

        self.rows = reconciled;

        if self.rows.len() != expected.len() {
            return Err(SubmissionError::RowCount {
                expected: expected.len(),
                got: self.rows.len(),
            }
            .into());
        }

        Ok(())
    }

    /// Validate row widths and probability bounds.
    pub fn validate(&self) -> Result<()> {
        for row in &self.rows {
            if row.probabilities.len() != self.species.len() {
                return Err(SubmissionError::RowWidth {
                    row_id: row.row_id.clone(),
                    expected: self.species.len(),
                    got: row.probabilities.len(),
                }
                .into());
            }
            for &p in &row.probabilities {
                if !(0.0..=1.0).contains(&p) || p.is_nan() {
                    return Err(SubmissionError::ProbabilityRange {
                        row_id: row.row_id.clone(),
                        value: p,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Write the table as CSV: `row_id` plus one column per species.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = csv::Writer::from_path(path).map_err(SubmissionError::from)?;

        let mut header = Vec::with_capacity(self.species.len() + 1);
        header.push("row_id".to_string());
        header.extend(self.species.iter().cloned());
        writer.write_record(&header).map_err(SubmissionError::from)?;

        for row in &self.rows {
            let mut record = Vec::with_capacity(row.probabilities.len() + 1);
            record.push(row.row_id.clone());
            record.extend(
                row.probabilities
                    .iter()
                    .map(|p| format!("{:.prec$}", p, prec = PROBABILITY_DECIMALS)),
            );
            writer.write_record(&record).map_err(SubmissionError::from)?;
        }

        writer.flush().map_err(SubmissionError::from)?;
        info!(path = %path.display(), rows = self.rows.len(), "wrote submission table");
        Ok(())
    }
}

/// Expected row ids and species columns from `sample_submission.csv`.
pub fn expected_from_sample(path: impl AsRef<Path>) -> Result<(Vec<String>, Vec<String>)> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).map_err(SchemaError::from)?;

    let header = reader.headers().map_err(SchemaError::from)?.clone();
    let mut columns = header.iter().map(str::to_string);
    match columns.next().as_deref() {
        Some("row_id") => {}
        _ => {
            return Err(SchemaError::MissingColumn {
                file: path.display().to_string(),
                column: "row_id".into(),
            }
            .into());
        }
    }
    let species: Vec<String> = columns.collect();

    let mut row_ids = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(SchemaError::from)?;
        let id = record
            .get(0)
            .ok_or_else(|| SchemaError::MalformedRow {
                file: path.display().to_string(),
                row: i + 2,
                reason: "empty record".into(),
            })?
            .to_string();
        row_ids.push(id);
    }

    Ok((row_ids, species))
}

/// Expected row ids derived from a file list, assuming nominal duration.
pub fn expected_from_files(files: &[std::path::PathBuf], config: &WindowConfig) -> Vec<String> {
    let per_file = crate::infer::NOMINAL_SOUNDSCAPE_SECS.div_ceil(config.window_secs.max(1));
    files
        .iter()
        .flat_map(|path| {
            let id = soundscape_id(path);
            (1..=per_file)
                .map(move |i| row_id(&id, i * config.window_secs))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Cross-check a model's species order against the sample submission header.
pub fn verify_species_columns(taxonomy: &Taxonomy, species: &[String]) -> Result<()> {
    let mut header = Vec::with_capacity(species.len() + 1);
    header.push("row_id".to_string());
    header.extend(species.iter().cloned());
    taxonomy.verify_submission_header(&header)
}
