//! Training metadata: `train.csv` records and weak supervision targets.
//!
//! A clip's positive set is its primary label plus any secondary labels.
//! Secondary labels are known-incomplete, so the absence of a species is
//! never treated as a confirmed negative: supervision targets carry a
//! per-species [`LabelState`] and the loss discounts unverified absences.

use crate::error::{Result, SchemaError};
use crate::taxonomy::Taxonomy;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// Source collection of a recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Collection {
    #[serde(rename = "XC")]
    XenoCanto,
    #[serde(rename = "iNat")]
    INaturalist,
    #[serde(rename = "CSA")]
    SoundArchive,
}

/// One row of `train.csv`.
#[derive(Clone, Debug, Deserialize)]
pub struct TrainRecord {
    pub primary_label: String,
    #[serde(deserialize_with = "deserialize_label_list")]
    pub secondary_labels: Vec<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub author: String,
    /// Path relative to `train_audio/`
    pub filename: String,
    /// Quality rating 0-5, 0 meaning unrated
    pub rating: f32,
    pub collection: Collection,
}

/// Supervision state of one species for one training clip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelState {
    /// The clip's primary label
    Primary,
    /// Additionally-noticed species (weaker provenance)
    Secondary,
    /// Not listed; an implicit, unconfirmed negative
    Unverified,
}

impl LabelState {
    /// True for either positive state.
    pub fn is_positive(&self) -> bool {
        matches!(self, LabelState::Primary | LabelState::Secondary)
    }
}

/// Load and validate `train.csv`.
///
/// Every primary and secondary label is checked against the taxonomy; an
/// unknown code is a fatal [`SchemaError`] since it would corrupt every
/// downstream supervision target.
pub fn load_train_csv(path: impl AsRef<Path>, taxonomy: &Taxonomy) -> Result<Vec<TrainRecord>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).map_err(SchemaError::from)?;

    let mut records = Vec::new();
    for (i, row) in reader.deserialize::<TrainRecord>().enumerate() {
        let record = row.map_err(|e| SchemaError::MalformedRow {
            file: path.display().to_string(),
            row: i + 2,
            reason: e.to_string(),
        })?;

        taxonomy.require(&record.primary_label)?;
        for code in &record.secondary_labels {
            taxonomy.require(code)?;
        }

        records.push(record);
    }

    tracing::info!(path = %path.display(), records = records.len(), "loaded training metadata");
    Ok(records)
}

/// Per-species supervision states for one record, in taxonomy column order.
pub fn label_states(
    record: &TrainRecord,
    taxonomy: &Taxonomy,
) -> std::result::Result<Vec<LabelState>, SchemaError> {
    let mut states = vec![LabelState::Unverified; taxonomy.len()];

    states[taxonomy.require(&record.primary_label)?] = LabelState::Primary;

    for code in &record.secondary_labels {
        let i = taxonomy.require(code)?;
        if states[i] == LabelState::Unverified {
            states[i] = LabelState::Secondary;
        }
    }

    Ok(states)
}

/// Parse the bracketed label-list syntax (`"['a', 'b']"`).
fn deserialize_label_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(parse_label_list(&raw))
}

fn parse_label_list(raw: &str) -> Vec<String> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|s| s.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::taxonomy::test_taxonomy;
    use std::io::Write;

    const HEADER: &str =
        "primary_label,secondary_labels,latitude,longitude,author,filename,rating,collection";

    fn write_train_csv(rows: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn parses_label_list_syntax() {
        assert_eq!(parse_label_list("[]"), Vec::<String>::new());
        assert_eq!(parse_label_list("['grekis']"), vec!["grekis"]);
        assert_eq!(
            parse_label_list("['grekis', 'bkcchi']"),
            vec!["grekis", "bkcchi"]
        );
        assert_eq!(parse_label_list("[\"65336\"]"), vec!["65336"]);
        assert_eq!(parse_label_list(""), Vec::<String>::new());
    }

    #[test]
    fn loads_records_with_optional_coordinates() {
        let taxonomy = test_taxonomy(&["grekis", "bkcchi"]);
        let file = write_train_csv(&[
            "grekis,\"['bkcchi']\",4.6097,-74.0817,Jane Doe,XC100001.ogg,4.5,XC",
            "bkcchi,[],,,Someone Else,iNat55555.ogg,0,iNat",
        ]);

        let records = load_train_csv(file.path(), &taxonomy).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].secondary_labels, vec!["bkcchi"]);
        assert_eq!(records[0].collection, Collection::XenoCanto);
        assert!((records[0].rating - 4.5).abs() < f32::EPSILON);
        assert_eq!(records[1].latitude, None);
        assert!(records[1].secondary_labels.is_empty());
    }

    #[test]
    fn rejects_unknown_primary_label() {
        let taxonomy = test_taxonomy(&["grekis"]);
        let file = write_train_csv(&["unknown1,[],,,A,XC1.ogg,3,XC"]);

        let result = load_train_csv(file.path(), &taxonomy);
        assert!(matches!(
            result,
            Err(Error::Schema(SchemaError::UnknownSpecies(_)))
        ));
    }

    #[test]
    fn rejects_malformed_row() {
        let taxonomy = test_taxonomy(&["grekis"]);
        let file = write_train_csv(&["grekis,[],,,A,XC1.ogg,not-a-number,XC"]);

        let result = load_train_csv(file.path(), &taxonomy);
        assert!(matches!(
            result,
            Err(Error::Schema(SchemaError::MalformedRow { row: 2, .. }))
        ));
    }

    #[test]
    fn primary_only_yields_single_positive() {
        let taxonomy = test_taxonomy(&["65336", "grekis", "bkcchi"]);
        let record = TrainRecord {
            primary_label: "65336".into(),
            secondary_labels: vec![],
            latitude: None,
            longitude: None,
            author: "A".into(),
            filename: "iNat1.ogg".into(),
            rating: 3.0,
            collection: Collection::INaturalist,
        };

        let states = label_states(&record, &taxonomy).unwrap();

        let positives = states.iter().filter(|s| s.is_positive()).count();
        assert_eq!(positives, 1);
        assert_eq!(states[0], LabelState::Primary);
        assert_eq!(states[1], LabelState::Unverified);
    }

    #[test]
    fn secondary_labels_become_secondary_positives() {
        let taxonomy = test_taxonomy(&["a", "b", "c"]);
        let record = TrainRecord {
            primary_label: "b".into(),
            secondary_labels: vec!["c".into()],
            latitude: None,
            longitude: None,
            author: "A".into(),
            filename: "XC2.ogg".into(),
            rating: 5.0,
            collection: Collection::XenoCanto,
        };

        let states = label_states(&record, &taxonomy).unwrap();

        assert_eq!(states[0], LabelState::Unverified);
        assert_eq!(states[1], LabelState::Primary);
        assert_eq!(states[2], LabelState::Secondary);
    }
}
