//! Versioned binary serialization of a fitted pipeline and its label codec.
//!
//! Layout: the 4-byte magic `CTPA`, a little-endian `u32` format version, a
//! little-endian `u64` payload length, then the `bincode` payload holding the
//! encoder vocabularies, the boosted trees and the ordered label list.
use std::fs;
use std::io::Write;
use std::path::Path;

use bincode::Options;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::label_codec::LabelCodec;
use crate::models::gbdt::GBDTClassifier;
use crate::pipeline::{FittedModel, Pipeline};
use crate::preprocessing::{CategoricalColumn, FeatureEncoder};

pub const MAGIC: &[u8; 4] = b"CTPA";
pub const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 8;

#[derive(Debug, Serialize, Deserialize)]
struct EncoderState {
    categorical: Vec<CategoricalColumn>,
    numeric: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactPayload {
    encoder: EncoderState,
    classifier: GBDTClassifier,
    labels: Vec<String>,
}

/// Serialize a fitted pipeline and its codec.
pub fn save(pipeline: &Pipeline, codec: &LabelCodec) -> Result<Vec<u8>> {
    pipeline.check_layout()?;
    let payload = ArtifactPayload {
        encoder: EncoderState {
            categorical: pipeline.encoder().categorical_columns().to_vec(),
            numeric: pipeline.encoder().numeric_columns().to_vec(),
        },
        classifier: pipeline.classifier().clone(),
        labels: codec.classes().to_vec(),
    };
    let body = bincode::options()
        .serialize(&payload)
        .map_err(|e| PipelineError::ArtifactCorrupt(format!("failed to encode payload: {}", e)))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(body.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&body);
    debug!("Serialized artifact: {} bytes", bytes.len());
    Ok(bytes)
}

/// Reconstruct a fitted model from bytes written by [`save`].
pub fn load(bytes: &[u8]) -> Result<FittedModel> {
    if bytes.len() < HEADER_LEN {
        return Err(corrupt(format!(
            "artifact is {} bytes, shorter than the {}-byte header",
            bytes.len(),
            HEADER_LEN
        )));
    }
    if &bytes[0..4] != MAGIC {
        return Err(corrupt("bad magic bytes"));
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "format version {} is not supported (expected {})",
            version, FORMAT_VERSION
        )));
    }
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[8..HEADER_LEN]);
    let declared = u64::from_le_bytes(len_bytes);
    let body = &bytes[HEADER_LEN..];
    if declared != body.len() as u64 {
        return Err(corrupt(format!(
            "payload length {} does not match declared length {}",
            body.len(),
            declared
        )));
    }

    let payload: ArtifactPayload = bincode::options()
        .with_limit(declared)
        .deserialize(body)
        .map_err(|e| corrupt(format!("failed to decode payload: {}", e)))?;

    payload.classifier.validate_structure()?;
    let encoder = FeatureEncoder::from_state(payload.encoder.categorical, payload.encoder.numeric)?;
    let codec = LabelCodec::from_classes(payload.labels)?;
    let pipeline = Pipeline::from_fitted(encoder, payload.classifier).map_err(as_corrupt)?;
    FittedModel::new(pipeline, codec).map_err(as_corrupt)
}

/// Write the artifact next to `path` and atomically rename it into place.
pub fn save_to_path<P: AsRef<Path>>(model: &FittedModel, path: P) -> Result<()> {
    let path = path.as_ref();
    let bytes = save(&model.pipeline, &model.codec)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PipelineError::Io(e.error))?;
    info!("Wrote model artifact to {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<FittedModel> {
    let bytes = fs::read(path.as_ref())?;
    let model = load(&bytes)?;
    info!(
        "Loaded model artifact from {} with classes {:?}",
        path.as_ref().display(),
        model.codec.classes()
    );
    Ok(model)
}

fn corrupt(reason: impl Into<String>) -> PipelineError {
    PipelineError::ArtifactCorrupt(reason.into())
}

/// Any inconsistency found while reassembling persisted state is corruption.
fn as_corrupt(err: PipelineError) -> PipelineError {
    match err {
        PipelineError::ArtifactCorrupt(_) => err,
        other => PipelineError::ArtifactCorrupt(other.to_string()),
    }
}
