//! The fixed species set and its submission column order.
//!
//! `taxonomy.csv` defines the full label space: one row per species, in the
//! order the submission table must use. Every prediction row emits a
//! probability for exactly this set.

use crate::error::{Result, SchemaError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Taxonomic class of a species.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxonomicClass {
    Aves,
    Amphibia,
    Mammalia,
    Insecta,
}

impl fmt::Display for TaxonomicClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaxonomicClass::Aves => "Aves",
            TaxonomicClass::Amphibia => "Amphibia",
            TaxonomicClass::Mammalia => "Mammalia",
            TaxonomicClass::Insecta => "Insecta",
        };
        f.write_str(name)
    }
}

/// One target species.
#[derive(Clone, Debug, Deserialize)]
pub struct Species {
    /// eBird code or iNaturalist taxon id
    #[serde(rename = "primary_label")]
    pub code: String,
    pub scientific_name: String,
    pub common_name: String,
    #[serde(rename = "class_name")]
    pub class: TaxonomicClass,
}

/// The ordered species set.
///
/// Order is the column order of the submission table and never changes after
/// loading.
#[derive(Clone, Debug)]
pub struct Taxonomy {
    species: Vec<Species>,
    index: HashMap<String, usize>,
}

impl Taxonomy {
    /// Load the species set from `taxonomy.csv`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] on unreadable files, malformed rows, or
    /// duplicate species codes.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path).map_err(SchemaError::from)?;

        let mut species = Vec::new();
        for (i, row) in reader.deserialize::<Species>().enumerate() {
            let entry = row.map_err(|e| SchemaError::MalformedRow {
                file: path.display().to_string(),
                row: i + 2,
                reason: e.to_string(),
            })?;
            species.push(entry);
        }

        Self::from_species(species)
    }

    /// Build a taxonomy from an in-memory species list.
    pub fn from_species(species: Vec<Species>) -> Result<Self> {
        let mut index = HashMap::with_capacity(species.len());
        for (i, entry) in species.iter().enumerate() {
            if index.insert(entry.code.clone(), i).is_some() {
                return Err(SchemaError::DuplicateSpecies(entry.code.clone()).into());
            }
        }
        Ok(Self { species, index })
    }

    /// Number of target species.
    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    /// Species in submission column order.
    pub fn species(&self) -> &[Species] {
        &self.species
    }

    /// Species codes in submission column order.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.species.iter().map(|s| s.code.as_str())
    }

    /// Column index of a species code.
    pub fn index_of(&self, code: &str) -> Option<usize> {
        self.index.get(code).copied()
    }

    /// Column index of a species code, failing on unknown codes.
    pub fn require(&self, code: &str) -> std::result::Result<usize, SchemaError> {
        self.index_of(code)
            .ok_or_else(|| SchemaError::UnknownSpecies(code.to_string()))
    }

    /// Taxonomic class of a species code.
    pub fn class_of(&self, code: &str) -> Option<TaxonomicClass> {
        self.index_of(code).map(|i| self.species[i].class)
    }

    /// Check a submission header (`row_id` plus species columns) against the
    /// taxonomy order.
    pub fn verify_submission_header(&self, header: &[String]) -> Result<()> {
        match header.first().map(String::as_str) {
            Some("row_id") => {}
            _ => {
                return Err(SchemaError::MissingColumn {
                    file: "submission header".into(),
                    column: "row_id".into(),
                }
                .into());
            }
        }

        let columns = &header[1..];
        if columns.len() != self.len() {
            return Err(SchemaError::HeaderWidth {
                expected: self.len(),
                got: columns.len(),
            }
            .into());
        }

        for (i, (got, expected)) in columns.iter().zip(self.codes()).enumerate() {
            if got != expected {
                return Err(SchemaError::HeaderColumn {
                    column: i + 1,
                    expected: expected.to_string(),
                    got: got.clone(),
                }
                .into());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_taxonomy(codes: &[&str]) -> Taxonomy {
    let species = codes
        .iter()
        .map(|&code| Species {
            code: code.to_string(),
            scientific_name: format!("Genus {code}"),
            common_name: format!("Common {code}"),
            class: TaxonomicClass::Aves,
        })
        .collect();
    Taxonomy::from_species(species).unwrap()
}
