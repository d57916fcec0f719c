use hound::WavReader;
use std::io::Cursor;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error)]
pub enum AudioError {
    #[error("audio upload is empty")]
    Empty,

    #[error("audio upload is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// An uploaded audio clip, as received from the client
///
/// The bytes are forwarded to the transcription service untouched; the
/// header is only inspected to learn the clip's length.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    /// Content type reported by the client, if any
    pub content_type: Option<String>,
    /// Length in seconds, when the container could be read
    pub duration_seconds: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

impl AudioClip {
    pub fn from_bytes(
        bytes: Vec<u8>,
        content_type: Option<String>,
        max_bytes: usize,
    ) -> Result<Self, AudioError> {
        if bytes.is_empty() {
            return Err(AudioError::Empty);
        }
        if bytes.len() > max_bytes {
            return Err(AudioError::TooLarge {
                size: bytes.len(),
                limit: max_bytes,
            });
        }

        let mut clip = Self {
            bytes,
            content_type,
            duration_seconds: None,
            sample_rate: None,
            channels: None,
        };

        if !clip.read_wav_header() && !clip.probe_container() {
            debug!(
                "Unrecognised audio container ({} bytes, type {:?}), duration unknown",
                clip.bytes.len(),
                clip.content_type
            );
        }

        Ok(clip)
    }

    fn read_wav_header(&mut self) -> bool {
        let Ok(reader) = WavReader::new(Cursor::new(self.bytes.as_slice())) else {
            return false;
        };

        let spec = reader.spec();
        // duration() is in frames (samples per channel)
        let frames = reader.duration();
        if spec.sample_rate > 0 {
            self.duration_seconds = Some(frames as f64 / spec.sample_rate as f64);
        }
        self.sample_rate = Some(spec.sample_rate);
        self.channels = Some(spec.channels);

        debug!(
            "WAV clip: {:?}s, {}Hz, {} channels",
            self.duration_seconds, spec.sample_rate, spec.channels
        );
        true
    }

    fn probe_container(&mut self) -> bool {
        let source = Cursor::new(self.bytes.clone());
        let stream = MediaSourceStream::new(Box::new(source), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(mime) = &self.content_type {
            hint.mime_type(mime);
        }

        let Ok(probed) = symphonia::default::get_probe().format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        ) else {
            return false;
        };

        let Some(track) = probed.format.default_track() else {
            return false;
        };

        let params = &track.codec_params;
        self.sample_rate = params.sample_rate;
        self.channels = params.channels.map(|c| c.count() as u16);
        if let (Some(frames), Some(rate)) = (params.n_frames, params.sample_rate) {
            if rate > 0 {
                self.duration_seconds = Some(frames as f64 / rate as f64);
            }
        }

        debug!(
            "Probed clip: {:?}s, {:?}Hz, {:?} channels",
            self.duration_seconds, self.sample_rate, self.channels
        );
        true
    }
}
