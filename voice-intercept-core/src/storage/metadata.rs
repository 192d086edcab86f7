//! JSON sidecar next to each capture recording.
//!
//! `voice.wav` gets `voice.capture.json`, written through a temporary file
//! so readers never see a half-written document.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::InterceptError;
use crate::models::recording_result::RecordingMetadata;

pub fn sidecar_path(recording_path: &Path) -> PathBuf {
    recording_path.with_extension("capture.json")
}

pub fn write_sidecar(metadata: &RecordingMetadata, recording_path: &Path) -> Result<PathBuf, InterceptError> {
    let path = sidecar_path(recording_path);
    let staging = path.with_extension("json.tmp");
    let json = serde_json::to_vec_pretty(metadata)
        .map_err(|e| InterceptError::StorageFailed(format!("failed to serialize sidecar: {}", e)))?;
    fs::write(&staging, json)
        .and_then(|_| fs::rename(&staging, &path))
        .map_err(|e| InterceptError::StorageFailed(format!("failed to write {}: {}", path.display(), e)))?;
    Ok(path)
}

pub fn read_sidecar(recording_path: &Path) -> Result<RecordingMetadata, InterceptError> {
    let path = sidecar_path(recording_path);
    let json = fs::read(&path)
        .map_err(|e| InterceptError::StorageFailed(format!("failed to read {}: {}", path.display(), e)))?;
    serde_json::from_slice(&json)
        .map_err(|e| InterceptError::StorageFailed(format!("malformed sidecar {}: {}", path.display(), e)))
}

/// Read the sidecar and confirm the recording still matches its checksum.
pub fn verify_recording(recording_path: &Path) -> Result<RecordingMetadata, InterceptError> {
    let metadata = read_sidecar(recording_path)?;
    let actual = sha256_file(recording_path)?;
    if actual != metadata.checksum {
        return Err(InterceptError::StorageFailed(format!(
            "{} changed since capture: sha256 {} != {}",
            recording_path.display(),
            actual,
            metadata.checksum
        )));
    }
    Ok(metadata)
}

pub fn sha256_file(path: &Path) -> Result<String, InterceptError> {
    let data = fs::read(path)
        .map_err(|e| InterceptError::StorageFailed(format!("failed to read {} for checksum: {}", path.display(), e)))?;
    Ok(Sha256::digest(&data).iter().map(|b| format!("{:02x}", b)).collect())
}
