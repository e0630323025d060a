use std::io::Cursor;

use serde::Serialize;

use super::UploadError;

/// Format of a WAV recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecordingInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub frames: u32,
    pub seconds: f64,
}

/// Check that `data` is a readable WAV with at least one frame.
pub fn inspect_recording(data: &[u8]) -> Result<RecordingInfo, UploadError> {
    let reader = hound::WavReader::new(Cursor::new(data))
        .map_err(|e| UploadError::InvalidRecording(e.to_string()))?;
    let spec = reader.spec();
    let frames = reader.duration();
    if frames == 0 {
        return Err(UploadError::InvalidRecording("recording is empty".to_string()));
    }
    Ok(RecordingInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
        frames,
        seconds: frames as f64 / spec.sample_rate.max(1) as f64,
    })
}
