use crate::api::client::GenerativeBackend;
use crate::api::models::{GenerateContentRequest, GenerationConfig};
use crate::audio::{decode_pcm16, wrap_wav, SpeechClip};
use crate::error::SpeechError;
use std::num::NonZeroU32;
use std::sync::Arc;

pub const DEFAULT_SAMPLE_RATE: NonZeroU32 = NonZeroU32::new(16000).unwrap();
/// Highest rate whose byte rate still fits the WAV header.
pub const MAX_SAMPLE_RATE: u32 = u32::MAX / 2;
const PCM_MIME_PREFIX: &str = "audio/L16";

/// Sample rate from a `rate=<digits>` media-type parameter. A missing, empty
/// or zero rate means the default; a rate above [`MAX_SAMPLE_RATE`] is
/// rejected.
pub fn parse_sample_rate(mime_type: &str) -> Result<NonZeroU32, SpeechError> {
    let Some(at) = mime_type.find("rate=") else {
        return Ok(DEFAULT_SAMPLE_RATE);
    };
    let digits: String = mime_type[at + "rate=".len()..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return Ok(DEFAULT_SAMPLE_RATE);
    }
    digits
        .parse::<u32>()
        .ok()
        .filter(|rate| *rate <= MAX_SAMPLE_RATE)
        .map(|rate| NonZeroU32::new(rate).unwrap_or(DEFAULT_SAMPLE_RATE))
        .ok_or_else(|| SpeechError::UnsupportedFormat(mime_type.to_string()))
}

/// Turns message text into a playable clip through a speech-generation model.
pub struct SpeechSynthesizer {
    backend: Arc<dyn GenerativeBackend>,
    model: String,
    voice: String,
}

impl SpeechSynthesizer {
    pub fn new(backend: Arc<dyn GenerativeBackend>, model: impl Into<String>, voice: impl Into<String>) -> Self {
        Self { backend, model: model.into(), voice: voice.into() }
    }

    pub async fn synthesize(&self, text: &str) -> Result<SpeechClip, SpeechError> {
        let mut request = GenerateContentRequest::from_text(format!("Say cheerfully: {}", text));
        request.generation_config = Some(GenerationConfig::audio(&self.voice));

        let response = self.backend.generate_content(&self.model, &request).await?;
        let inline = response
            .first_part()
            .and_then(|p| p.inline_data.as_ref())
            .ok_or(SpeechError::MissingAudio)?;
        let data = inline.data.as_deref().ok_or(SpeechError::MissingAudio)?;
        let mime = inline.mime_type.as_deref().unwrap_or_default();
        if !mime.starts_with(PCM_MIME_PREFIX) {
            return Err(SpeechError::UnsupportedFormat(mime.to_string()));
        }

        let sample_rate = parse_sample_rate(mime)?;
        let samples = decode_pcm16(data)?;
        log::debug!("synthesized {} samples at {} Hz", samples.len(), sample_rate);
        Ok(SpeechClip {
            sample_rate,
            sample_count: samples.len(),
            wav: wrap_wav(&samples, sample_rate)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeError, TransportError};
    use crate::test_support::{audio_response, text_response, ScriptedBackend};
    use base64::Engine;

    fn b64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn rate_parsing() {
        let rate = |mime: &str| parse_sample_rate(mime).unwrap().get();
        assert_eq!(rate("audio/L16;codec=pcm;rate=24000"), 24000);
        assert_eq!(rate("audio/L16"), DEFAULT_SAMPLE_RATE.get());
        assert_eq!(rate("audio/L16;rate="), DEFAULT_SAMPLE_RATE.get());
        assert_eq!(rate("audio/L16;rate=0"), DEFAULT_SAMPLE_RATE.get());
        assert_eq!(rate("audio/L16;rate=2147483647"), MAX_SAMPLE_RATE);
    }

    #[test]
    fn out_of_range_rates_are_rejected() {
        for mime in ["audio/L16;rate=2147483648", "audio/L16;rate=3000000000", "audio/L16;rate=99999999999"] {
            assert!(matches!(parse_sample_rate(mime), Err(SpeechError::UnsupportedFormat(m)) if m == mime));
        }
    }

    #[tokio::test]
    async fn four_bytes_become_two_samples_and_48_byte_wav() {
        let data = b64(&[1, 0, 2, 0]);
        let backend = Arc::new(ScriptedBackend::default().reply(Ok(audio_response(Some("audio/L16;rate=24000"), Some(&data)))));
        let synth = SpeechSynthesizer::new(backend.clone(), "tts-model", "Puck");

        let clip = synth.synthesize("hello").await.unwrap();
        assert_eq!(clip.sample_count, 2);
        assert_eq!(clip.sample_rate.get(), 24000);
        assert_eq!(clip.wav.len(), 48);

        let (model, req) = backend.last_request();
        assert_eq!(model, "tts-model");
        let config = req.generation_config.unwrap();
        assert_eq!(config.response_modalities, ["AUDIO"]);
        assert_eq!(config.speech_config.voice_config.prebuilt_voice_config.voice_name, "Puck");
    }

    #[tokio::test]
    async fn classification_of_bad_replies() {
        let backend = Arc::new(
            ScriptedBackend::default()
                .reply(Ok(text_response("no audio here")))
                .reply(Ok(audio_response(Some("audio/L16"), None)))
                .reply(Ok(audio_response(Some("audio/mpeg"), Some("AAAA"))))
                .reply(Ok(audio_response(Some("audio/L16;rate=8000"), Some(&b64(&[1, 2, 3])))))
                .reply(Err(TransportError::Status(500))),
        );
        let synth = SpeechSynthesizer::new(backend, "m", "v");

        assert!(matches!(synth.synthesize("x").await, Err(SpeechError::MissingAudio)));
        assert!(matches!(synth.synthesize("x").await, Err(SpeechError::MissingAudio)));
        assert!(matches!(synth.synthesize("x").await, Err(SpeechError::UnsupportedFormat(m)) if m == "audio/mpeg"));
        assert!(matches!(synth.synthesize("x").await, Err(SpeechError::Decode(DecodeError::OddLength(3)))));
        assert!(matches!(synth.synthesize("x").await, Err(SpeechError::Transport(TransportError::Status(500)))));
    }

    #[tokio::test]
    async fn oversized_rate_in_reply_is_unsupported() {
        let mime = "audio/L16;rate=3000000000";
        let backend = Arc::new(ScriptedBackend::default().reply(Ok(audio_response(Some(mime), Some("AQACAA==")))));
        let synth = SpeechSynthesizer::new(backend, "m", "v");

        assert!(matches!(synth.synthesize("x").await, Err(SpeechError::UnsupportedFormat(m)) if m == mime));
    }
}
