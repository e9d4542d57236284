//! Training-collection inventory.
//!
//! Scans `train_audio/` and reports what the collection actually contains:
//! file counts per species and per taxonomic class, duration statistics, and
//! the species with the fewest recordings. Decode problems are collected per
//! file, never fatal, so a single bad recording cannot hide the rest of the
//! collection.

use crate::audio;
use crate::error::{Result, SchemaError};
use crate::taxonomy::Taxonomy;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// One scanned audio file.
#[derive(Clone, Debug, Serialize)]
pub struct FileEntry {
    pub path: PathBuf,
    /// Species code, taken from the parent directory name
    pub species: String,
    /// Taxonomic class, when the species is in the taxonomy
    pub class: Option<String>,
    pub duration_secs: Option<f32>,
    pub error: Option<String>,
}

/// Duration statistics over successfully decoded files.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct DurationStats {
    pub mean: f32,
    pub median: f32,
    pub min: f32,
    pub max: f32,
    pub total_hours: f32,
}

/// Aggregated collection summary.
#[derive(Clone, Debug, Serialize)]
pub struct InventorySummary {
    pub total_files: usize,
    pub total_species: usize,
    pub files_per_species: BTreeMap<String, usize>,
    pub files_per_class: BTreeMap<String, usize>,
    pub duration: DurationStats,
    pub error_count: usize,
}

/// Scan a training-audio directory.
///
/// Every audio file under `dir` becomes a [`FileEntry`]; the parent
/// directory name is the species code. Files are decoded in parallel for
/// duration measurement, and decode failures are recorded on the entry.
pub fn scan(dir: &Path, taxonomy: &Taxonomy) -> Result<Vec<FileEntry>> {
    if !dir.is_dir() {
        return Err(SchemaError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("training audio directory not found: {}", dir.display()),
        ))
        .into());
    }

    let paths: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| audio::is_audio_file(path))
        .collect();

    info!(dir = %dir.display(), files = paths.len(), "scanning training audio");

    let mut entries: Vec<FileEntry> = paths
        .into_par_iter()
        .map(|path| {
            let species = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string();
            let class = taxonomy.class_of(&species).map(|c| c.to_string());

            let (duration_secs, error) = match audio::decode_file(&path) {
                Ok(samples) => (Some(audio::duration_secs(&samples)), None),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "inventory decode failed");
                    (None, Some(e.to_string()))
                }
            };

            FileEntry {
                path,
                species,
                class,
                duration_secs,
                error,
            }
        })
        .collect();

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Aggregate scanned entries into a summary.
pub fn summarize(entries: &[FileEntry]) -> InventorySummary {
    let mut files_per_species: BTreeMap<String, usize> = BTreeMap::new();
    let mut files_per_class: BTreeMap<String, usize> = BTreeMap::new();
    let mut durations: Vec<f32> = Vec::new();
    let mut error_count = 0;

    for entry in entries {
        *files_per_species.entry(entry.species.clone()).or_default() += 1;
        let class = entry.class.clone().unwrap_or_else(|| "unknown".to_string());
        *files_per_class.entry(class).or_default() += 1;

        match entry.duration_secs {
            Some(d) => durations.push(d),
            None => error_count += 1,
        }
    }

    InventorySummary {
        total_files: entries.len(),
        total_species: files_per_species.len(),
        files_per_species,
        files_per_class,
        duration: duration_stats(&mut durations),
        error_count,
    }
}

/// The `n` species with the fewest recordings, ascending.
pub fn rarest_species(summary: &InventorySummary, n: usize) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = summary
        .files_per_species
        .iter()
        .map(|(species, &count)| (species.clone(), count))
        .collect();
    counts.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    counts.truncate(n);
    counts
}

/// Write the per-file table as CSV.
pub fn write_csv(entries: &[FileEntry], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path).map_err(SchemaError::from)?;

    writer
        .write_record(["path", "species", "class", "duration_secs", "error"])
        .map_err(SchemaError::from)?;

    for entry in entries {
        writer
            .write_record([
                entry.path.display().to_string(),
                entry.species.clone(),
                entry.class.clone().unwrap_or_default(),
                entry
                    .duration_secs
                    .map(|d| format!("{d:.2}"))
                    .unwrap_or_default(),
                entry.error.clone().unwrap_or_default(),
            ])
            .map_err(SchemaError::from)?;
    }

    writer.flush().map_err(SchemaError::from)?;
    info!(path = %path.display(), rows = entries.len(), "wrote inventory table");
    Ok(())
}

fn duration_stats(durations: &mut Vec<f32>) -> DurationStats {
    if durations.is_empty() {
        return DurationStats::default();
    }

    durations.sort_by(f32::total_cmp);
    let n = durations.len();
    let total: f32 = durations.iter().sum();
    let median = if n % 2 == 0 {
        (durations[n / 2 - 1] + durations[n / 2]) / 2.0
    } else {
        durations[n / 2]
    };

    DurationStats {
        mean: total / n as f32,
        median,
        min: durations[0],
        max: durations[n - 1],
        total_hours: total / 3600.0,
    }
}

impl fmt::Display for InventorySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "total files:    {}", self.total_files)?;
        writeln!(f, "total species:  {}", self.total_species)?;
        writeln!(f, "decode errors:  {}", self.error_count)?;
        writeln!(
            f,
            "duration:       mean {:.1}s, median {:.1}s, min {:.1}s, max {:.1}s, total {:.2}h",
            self.duration.mean,
            self.duration.median,
            self.duration.min,
            self.duration.max,
            self.duration.total_hours
        )?;
        writeln!(f, "files per class:")?;
        for (class, count) in &self.files_per_class {
            writeln!(f, "  {class}: {count}")?;
        }
        Ok(())
    }
}
