//! Azure Cognitive Services text-to-speech over REST.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{http_client, SpeechEngine, SpeechRequest};
use crate::error::{CommentaryError, Result};
use crate::models::AudioFormat;

/// 24kHz 16-bit mono PCM in a RIFF container
pub const OUTPUT_FORMAT: &str = "riff-24khz-16bit-mono-pcm";
const USER_AGENT: &str = "commentator";

pub struct AzureSpeechClient {
    client: Client,
    key: String,
    region: String,
    endpoint: Option<String>,
}

impl std::fmt::Debug for AzureSpeechClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureSpeechClient")
            .field("region", &self.region)
            .finish()
    }
}

/// One entry of the voices list
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoiceInfo {
    pub short_name: String,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub style_list: Vec<String>,
}

impl AzureSpeechClient {
    pub fn new(key: impl Into<String>, region: impl Into<String>) -> Self {
        Self::with_client(http_client(Duration::from_secs(30)), key, region)
    }

    pub fn with_client(client: Client, key: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            client,
            key: key.into(),
            region: region.into(),
            endpoint: None,
        }
    }

    /// Override `https://{region}.tts.speech.microsoft.com` (for local stubs)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into().trim_end_matches('/').to_string());
        self
    }

    fn base_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://{}.tts.speech.microsoft.com", self.region),
        }
    }

    /// Voices available in the configured region
    #[tracing::instrument(skip(self), fields(region = %self.region))]
    pub async fn list_voices(&self) -> Result<Vec<VoiceInfo>> {
        let resp = self
            .client
            .get(format!("{}/cognitiveservices/voices/list", self.base_url()))
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .send()
            .await
            .map_err(|e| CommentaryError::SynthesisUnavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        resp.json::<Vec<VoiceInfo>>()
            .await
            .map_err(|e| CommentaryError::SynthesisUnavailable(format!("voice list: {e}")))
    }
}

fn classify_status(status: StatusCode, body: &str) -> CommentaryError {
    let message = format!("HTTP {} {}", status.as_u16(), body.trim());
    if status == StatusCode::BAD_REQUEST {
        // Azure answers 400 for unknown voices and invalid prosody values
        CommentaryError::UnsupportedVoiceProfile(message)
    } else {
        CommentaryError::SynthesisUnavailable(message)
    }
}

#[async_trait]
impl SpeechEngine for AzureSpeechClient {
    #[tracing::instrument(skip_all, fields(voice = %request.voice_name))]
    async fn render(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        let resp = self
            .client
            .post(format!("{}/cognitiveservices/v1", self.base_url()))
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
            .header("User-Agent", USER_AGENT)
            .body(request.ssml.clone())
            .send()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to make http request"))
            .map_err(|e| CommentaryError::SynthesisUnavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| CommentaryError::SynthesisUnavailable(e.to_string()))?;
        if bytes.is_empty() {
            return Err(CommentaryError::SynthesisUnavailable(
                "empty audio payload".into(),
            ));
        }
        Ok(bytes.to_vec())
    }

    fn output_format(&self) -> AudioFormat {
        AudioFormat::Wav
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "voice not found"),
            CommentaryError::UnsupportedVoiceProfile(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            CommentaryError::SynthesisUnavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            CommentaryError::SynthesisUnavailable(_)
        ));
    }

    #[test]
    fn test_base_url() {
        let client = AzureSpeechClient::new("key", "eastus");
        assert_eq!(client.base_url(), "https://eastus.tts.speech.microsoft.com");

        let client = client.with_endpoint("http://127.0.0.1:8080/");
        assert_eq!(client.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_voice_list_parsing() {
        let voices: Vec<VoiceInfo> = serde_json::from_value(serde_json::json!([
            {
                "Name": "Microsoft Server Speech Text to Speech Voice (en-US, GuyNeural)",
                "ShortName": "en-US-GuyNeural",
                "Gender": "Male",
                "Locale": "en-US",
                "StyleList": ["newscast", "excited"]
            },
            {"ShortName": "en-GB-RyanNeural", "Locale": "en-GB"}
        ]))
        .unwrap();
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].short_name, "en-US-GuyNeural");
        assert_eq!(voices[0].style_list, vec!["newscast", "excited"]);
        assert!(voices[1].style_list.is_empty());
    }
}
