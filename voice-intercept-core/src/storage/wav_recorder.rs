use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::models::error::InterceptError;
use crate::models::recording_result::{RecordingMetadata, RecordingResult, StrategyFrames};
use crate::models::samples::SampleBatch;
use crate::models::state::StrategyTag;
use crate::processing::wav_format::{self, WavSpec};
use crate::storage::metadata;
use crate::traits::capture_delegate::CaptureDelegate;

struct RecorderState {
    file: Option<BufWriter<File>>,
    data_bytes: u64,
    strategy_frames: BTreeMap<StrategyTag, u64>,
    session_id: Option<String>,
    diagnostics: Option<String>,
    write_failed: bool,
}

/// Streaming WAV writer for delivered voice batches.
///
/// Register it as the engine's delegate to dump everything captured to
/// disk. Batches from every strategy land in the same 16-bit mono stream.
///
/// ```text
/// [44-byte WAV header, sizes patched on close]
/// [raw 16-bit LE PCM...]
/// ```
pub struct WavRecorder {
    path: PathBuf,
    spec: WavSpec,
    state: Mutex<RecorderState>,
}

impl WavRecorder {
    /// Create the file and write a placeholder header.
    pub fn create(path: impl Into<PathBuf>, sample_rate: u32) -> Result<Self, InterceptError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| InterceptError::StorageFailed(format!("failed to create directory: {}", e)))?;
        }
        let file = File::create(&path)
            .map_err(|e| InterceptError::StorageFailed(format!("failed to create file: {}", e)))?;

        let spec = WavSpec::voice(sample_rate);
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&wav_format::generate_wav_header(spec, 0))
            .map_err(|e| InterceptError::StorageFailed(format!("write failed: {}", e)))?;

        Ok(Self {
            path,
            spec,
            state: Mutex::new(RecorderState {
                file: Some(writer),
                data_bytes: 0,
                strategy_frames: BTreeMap::new(),
                session_id: None,
                diagnostics: None,
                write_failed: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PCM bytes written so far, excluding the header.
    pub fn data_bytes(&self) -> u64 {
        self.state.lock().data_bytes
    }

    /// Tag the sidecar with the engine session that feeds this recording.
    pub fn set_session_id(&self, session_id: impl Into<String>) {
        self.state.lock().session_id = Some(session_id.into());
    }

    /// Store a diagnostics summary to be written into the sidecar on close.
    /// A later call replaces the earlier summary.
    pub fn attach_diagnostics(&self, summary: impl Into<String>) {
        self.state.lock().diagnostics = Some(summary.into());
    }

    pub fn write_batch(&self, batch: &SampleBatch) -> Result<(), InterceptError> {
        let mut state = self.state.lock();
        let file = state
            .file
            .as_mut()
            .ok_or_else(|| InterceptError::StorageFailed("recording is closed".into()))?;
        let bytes = batch.to_le_bytes();
        file.write_all(&bytes)
            .map_err(|e| InterceptError::StorageFailed(format!("write failed: {}", e)))?;
        state.data_bytes += bytes.len() as u64;
        *state.strategy_frames.entry(batch.strategy).or_default() += batch.frame_count() as u64;
        Ok(())
    }

    /// Patch the header, checksum the file and write the metadata sidecar.
    pub fn close(&self) -> Result<RecordingResult, InterceptError> {
        let mut state = self.state.lock();
        let writer = state
            .file
            .take()
            .ok_or_else(|| InterceptError::StorageFailed("recording is already closed".into()))?;
        let mut file = writer
            .into_inner()
            .map_err(|e| InterceptError::StorageFailed(format!("flush failed: {}", e.error())))?;

        let mut header = wav_format::generate_wav_header(self.spec, 0);
        wav_format::patch_sizes(&mut header, state.data_bytes);
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(&header))
            .and_then(|_| file.sync_all())
            .map_err(|e| InterceptError::StorageFailed(format!("failed to finalize header: {}", e)))?;
        drop(file);

        let checksum = metadata::sha256_file(&self.path)?;
        let strategies = state
            .strategy_frames
            .iter()
            .map(|(&strategy, &frames)| StrategyFrames { strategy, frames })
            .collect();
        let mut metadata =
            RecordingMetadata::new_voice(&self.path.to_string_lossy(), &checksum, self.spec.sample_rate, strategies);
        metadata.session_id = state.session_id.take();
        metadata.diagnostics = state.diagnostics.take();
        let sidecar = metadata::write_sidecar(&metadata, &self.path)?;
        log::info!(
            "recording closed: {} ({} frames, mostly {:?}, sidecar {})",
            self.path.display(),
            metadata.frames,
            metadata.primary_strategy,
            sidecar.display()
        );

        Ok(RecordingResult {
            file_path: self.path.clone(),
            duration_secs: metadata.duration_secs,
            metadata,
            checksum,
        })
    }
}

impl CaptureDelegate for WavRecorder {
    fn on_samples(&self, batch: &SampleBatch) {
        if let Err(e) = self.write_batch(batch) {
            let mut state = self.state.lock();
            if !state.write_failed {
                state.write_failed = true;
                log::error!("recording {} stopped accepting audio: {}", self.path.display(), e);
            }
        }
    }
}
