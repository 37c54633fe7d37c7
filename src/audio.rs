use crate::error::{DecodeError, SpeechError};
use async_trait::async_trait;
use base64::Engine;
use std::io::Write;
use std::num::NonZeroU32;

pub const WAV_HEADER_LEN: usize = 44;

/// Decodes base64 into little-endian signed 16-bit samples.
pub fn decode_pcm16(data: &str) -> Result<Vec<i16>, DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| DecodeError::Base64(e.to_string()))?;
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Mono 16-bit PCM WAV: canonical 44-byte header followed by the samples.
/// Fails when a header field would not fit its 32-bit slot.
pub fn wrap_wav(samples: &[i16], sample_rate: NonZeroU32) -> Result<Vec<u8>, DecodeError> {
    let data_len = samples
        .len()
        .checked_mul(2)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or(DecodeError::HeaderOverflow("data length"))?;
    let riff_len = data_len.checked_add(36).ok_or(DecodeError::HeaderOverflow("RIFF length"))?;
    let rate = sample_rate.get();
    let byte_rate = rate.checked_mul(2).ok_or(DecodeError::HeaderOverflow("byte rate"))?;
    let mut out = Vec::with_capacity(WAV_HEADER_LEN + data_len as usize);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&riff_len.to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    // PCM, mono
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    Ok(out)
}

/// A synthesized, playable clip.
#[derive(Debug, Clone)]
pub struct SpeechClip {
    pub sample_rate: NonZeroU32,
    pub sample_count: usize,
    pub wav: Vec<u8>,
}

/// Local audio output. `play` resolves once playback has ended.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, clip: &SpeechClip) -> Result<(), SpeechError>;
}

/// Plays clips by handing a temporary WAV file to an external player.
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }
}

#[async_trait]
impl AudioSink for CommandSink {
    async fn play(&self, clip: &SpeechClip) -> Result<(), SpeechError> {
        let mut file = tempfile::Builder::new()
            .prefix("duo-chat-")
            .suffix(".wav")
            .tempfile()
            .map_err(|e| SpeechError::Playback(e.to_string()))?;
        file.write_all(&clip.wav)
            .and_then(|_| file.flush())
            .map_err(|e| SpeechError::Playback(e.to_string()))?;

        log::debug!("playing {} samples at {} Hz via {}", clip.sample_count, clip.sample_rate, self.program);
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(file.path())
            .status()
            .await
            .map_err(|e| SpeechError::Playback(format!("{}: {}", self.program, e)))?;
        if !status.success() {
            return Err(SpeechError::Playback(format!("{} exited with {}", self.program, status)));
        }
        Ok(())
    }
}
