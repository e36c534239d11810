//! Audio boundaries: transcription (audio → text) and synthesis
//! (text → WAV).
//!
//! Both are opaque capabilities consumed over the Gemini REST API and both
//! are advisory: a transcription failure leaves the user typing instead, a
//! synthesis failure leaves the reply on screen. Neither aborts the turn.
//!
//! Synthesized audio arrives as base64 raw PCM (16-bit little-endian mono
//! at 24 kHz); [`synthesize`] wraps it into a playable WAV container.

use anyhow::{bail, Context, Result};
use base64::Engine;
use std::time::Duration;

use crate::config::SpeechConfig;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// PCM parameters of the TTS endpoint's output.
const TTS_SAMPLE_RATE: u32 = 24_000;
const TTS_CHANNELS: u16 = 1;
const TTS_BITS_PER_SAMPLE: u16 = 16;

/// MIME type for an audio file, from its name suffix.
pub fn audio_mime(name: &str) -> Option<&'static str> {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".wav") {
        Some("audio/wav")
    } else if lower.ends_with(".mp3") {
        Some("audio/mp3")
    } else if lower.ends_with(".ogg") {
        Some("audio/ogg")
    } else if lower.ends_with(".flac") {
        Some("audio/flac")
    } else {
        None
    }
}

/// Transcribes an audio payload to text.
pub async fn transcribe(config: &SpeechConfig, audio: &[u8], mime: &str) -> Result<String> {
    let api_key = std::env::var("GEMINI_API_KEY")
        .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "contents": [{
            "parts": [
                { "text": "Transcribe this audio verbatim. Return only the transcript." },
                { "inline_data": {
                    "mime_type": mime,
                    "data": base64::engine::general_purpose::STANDARD.encode(audio),
                }},
            ],
        }],
    });

    let url = format!("{}/{}:generateContent", GEMINI_BASE_URL, config.transcribe_model);
    let resp = client
        .post(&url)
        .header("x-goog-api-key", &api_key)
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .context("Transcription request failed")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        bail!("Transcription failed (HTTP {}): {}", status, body_text);
    }

    let json: serde_json::Value = resp.json().await?;
    let text = first_candidate_text(&json)
        .ok_or_else(|| anyhow::anyhow!("Transcription response contained no text"))?;
    Ok(text.trim().to_string())
}

/// Synthesizes speech for `text`, returning complete WAV bytes.
pub async fn synthesize(config: &SpeechConfig, text: &str) -> Result<Vec<u8>> {
    let api_key = std::env::var("GEMINI_API_KEY")
        .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "contents": [{ "parts": [{ "text": text }] }],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": config.voice }
                }
            }
        },
    });

    let url = format!("{}/{}:generateContent", GEMINI_BASE_URL, config.tts_model);
    let resp = client
        .post(&url)
        .header("x-goog-api-key", &api_key)
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .context("Speech synthesis request failed")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        bail!("Speech synthesis failed (HTTP {}): {}", status, body_text);
    }

    let json: serde_json::Value = resp.json().await?;
    let b64 = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.pointer("/content/parts/0/inlineData/data"))
        .and_then(|d| d.as_str())
        .ok_or_else(|| anyhow::anyhow!("Synthesis response contained no audio"))?;

    let pcm = base64::engine::general_purpose::STANDARD
        .decode(b64)
        .context("Synthesis response audio was not valid base64")?;
    pcm_to_wav(&pcm)
}

/// Wraps raw 16-bit little-endian mono PCM into a WAV container.
fn pcm_to_wav(pcm: &[u8]) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: TTS_CHANNELS,
        sample_rate: TTS_SAMPLE_RATE,
        bits_per_sample: TTS_BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };

    let mut out = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut out, spec).context("Failed to start WAV writer")?;
        for chunk in pcm.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            writer.write_sample(sample)?;
        }
        writer.finalize().context("Failed to finalize WAV")?;
    }
    Ok(out.into_inner())
}

fn first_candidate_text(json: &serde_json::Value) -> Option<String> {
    let parts = json
        .get("candidates")?
        .as_array()?
        .first()?
        .pointer("/content/parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
