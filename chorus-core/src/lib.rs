//! chorus-core: soundscape multi-label species tagging pipeline.
//!
//! Turns field recordings into per-species presence probabilities over
//! fixed-length analysis windows, in the shape a soundscape-tagging
//! submission expects.
//!
//! # Architecture
//!
//! Data flows through five stages:
//!
//! - [`audio`]: decode recordings to mono PCM at 32kHz
//! - [`window`]: slice recordings into fixed-length analysis windows
//! - [`features`]: turn each window into a log-mel feature frame
//! - [`model`]: map feature frames to per-species probabilities
//! - [`infer`] / [`submission`]: aggregate per-window predictions into a
//!   complete, validated submission table
//!
//! Training metadata and the fixed species set live in [`metadata`] and
//! [`taxonomy`]; [`training`] prepares labeled clips into training
//! examples; [`inventory`] summarizes what a training collection contains.
//!
//! # Quick Start
//!
//! ```ignore
//! use chorus_core::infer::{predict_directory, InferenceConfig};
//! use chorus_core::model::LinearTagger;
//! use std::sync::Arc;
//!
//! let model = Arc::new(LinearTagger::load("model.json")?);
//! let rows = predict_directory(&model, "test_soundscapes".as_ref(), &InferenceConfig::default());
//! ```

pub mod audio;
pub mod error;
pub mod features;
pub mod infer;
pub mod inventory;
pub mod metadata;
pub mod model;
pub mod submission;
pub mod taxonomy;
pub mod training;
pub mod window;

pub use error::{Error, Result};
