//! Error types for chorus-core organized by pipeline stage.

use ndarray::ShapeError;
use thiserror::Error;

/// Pipeline error variants organized by processing stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Data-contract violation in a CSV input (fatal for the run)
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Audio decoding stage error (recoverable per file)
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Model training or inference error
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Submission assembly or emission error
    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

/// CSV schema and data-contract errors.
///
/// These indicate that an input file violates the expected layout. They are
/// fatal for the whole run: a bad schema would corrupt every downstream row.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Required column missing from a CSV header
    #[error("missing column `{column}` in {file}")]
    MissingColumn { file: String, column: String },

    /// Species code not present in the taxonomy
    #[error("unknown species code `{0}`")]
    UnknownSpecies(String),

    /// Duplicate species code in the taxonomy
    #[error("duplicate species code `{0}` in taxonomy")]
    DuplicateSpecies(String),

    /// Row failed to parse
    #[error("malformed row {row} in {file}: {reason}")]
    MalformedRow {
        file: String,
        row: usize,
        reason: String,
    },

    /// Submission header has the wrong number of species columns
    #[error("submission header has {got} species columns, expected {expected}")]
    HeaderWidth { expected: usize, got: usize },

    /// Submission header column does not match the taxonomy order
    #[error("submission header column {column}: expected `{expected}`, got `{got}`")]
    HeaderColumn {
        column: usize,
        expected: String,
        got: String,
    },

    /// CSV parsing error
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// IO error while reading a data file
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Audio decoding and validation errors.
///
/// Recoverable per unit of input: callers skip the file and log, they never
/// abort a batch over a single bad recording.
#[derive(Debug, Error)]
pub enum AudioError {
    /// File could not be decoded
    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },

    /// Container holds no audio track
    #[error("no audio track in {path}")]
    NoTrack { path: String },

    /// Decoded stream produced no samples
    #[error("empty audio stream in {path}")]
    Empty { path: String },

    /// Sample-rate conversion failed
    #[error("resampling {path} from {from}Hz failed: {reason}")]
    Resample {
        path: String,
        from: u32,
        reason: String,
    },
}

/// Model training, persistence, and inference errors.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Feature vector length does not match the trained parameters
    #[error("feature length mismatch: model expects {expected}, got {got}")]
    FeatureLength { expected: usize, got: usize },

    /// No usable training examples remained after filtering
    #[error("no training examples after filtering")]
    NoExamples,

    /// Training examples disagree on feature dimensionality
    #[error("inconsistent example length: expected {expected}, got {got}")]
    InconsistentExamples { expected: usize, got: usize },

    /// ndarray shape error while rebuilding parameters
    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// Parameter (de)serialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// IO error while reading or writing parameters
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Submission table assembly and emission errors.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// The same row_id was produced more than once
    #[error("duplicate row id `{0}`")]
    DuplicateRow(String),

    /// A probability left the valid range
    #[error("row `{row_id}` has probability {value} outside [0, 1]")]
    ProbabilityRange { row_id: String, value: f32 },

    /// A row has the wrong number of species columns
    #[error("row `{row_id}` has {got} probabilities, expected {expected}")]
    RowWidth {
        row_id: String,
        expected: usize,
        got: usize,
    },

    /// Row set still mismatched after reconciliation
    #[error("row count mismatch: expected {expected}, got {got}")]
    RowCount { expected: usize, got: usize },

    /// CSV writing error
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// IO error while writing the table
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for chorus-core operations.
pub type Result<T> = std::result::Result<T, Error>;

// Nested From implementations for automatic error conversion chains

// serde_json::Error → ModelError → Error
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Model(ModelError::Json(e))
    }
}

// ShapeError → ModelError → Error
impl From<ShapeError> for Error {
    fn from(e: ShapeError) -> Self {
        Error::Model(ModelError::Shape(e))
    }
}
