use std::time::Duration;

use bytes::Bytes;
use log::{debug, error, info};
use reqwest::Client;
use serde_json::json;

use super::ElevenLabsConfig;
use crate::config::{OutputFormat, ProviderKind};
use crate::errors::{AppError, AppResult};
use crate::services::tts::{map_status_error, TtsProvider, Voice};

const API_BASE: &str = "https://api.elevenlabs.io/v1";

/// Предустановленные голоса каталога ElevenLabs
const VOICES: &[(&str, &str)] = &[
    ("21m00Tcm4TlvDq8ikWAM", "Rachel"),
    ("AZnzlk1XvdvUeBnXmlld", "Domi"),
    ("EXAVITQu4vr4xnSDxMaL", "Bella"),
    ("ErXwobaYiN019PkySvjV", "Antoni"),
    ("TxGEqnHWrfWFTfGW9XjX", "Josh"),
    ("pNInz6obpgDQGcFmaJgB", "Adam"),
];

/// Клиент для работы с ElevenLabs API
pub struct ElevenLabsClient {
    client: Client,
    api_key: String,
    config: ElevenLabsConfig,
}

impl ElevenLabsClient {
    /// Создает новый клиент ElevenLabs
    pub fn new(api_key: String, timeout: Duration) -> AppResult<Self> {
        if api_key.trim().is_empty() {
            return Err(AppError::Configuration(
                "ElevenLabs API key is required".to_string(),
            ));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            config: ElevenLabsConfig::default(),
        })
    }
}

#[async_trait::async_trait]
impl TtsProvider for ElevenLabsClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ElevenLabs
    }

    fn voices(&self) -> Vec<Voice> {
        VOICES
            .iter()
            .map(|(id, name)| Voice {
                id: id.to_string(),
                name: name.to_string(),
                language: "multi".to_string(),
                description: None,
            })
            .collect()
    }

    fn default_voice(&self) -> &'static str {
        "21m00Tcm4TlvDq8ikWAM"
    }

    fn cost_per_1000_chars(&self) -> f64 {
        0.11
    }

    fn max_requests_per_minute(&self) -> u32 {
        crate::services::tts::declared_rpm(ProviderKind::ElevenLabs)
    }

    fn max_input_chars(&self) -> usize {
        2500
    }

    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        format: OutputFormat,
    ) -> AppResult<Bytes> {
        // ElevenLabs отдает только сжатые форматы
        if format == OutputFormat::Wav {
            return Err(AppError::Configuration(
                "ElevenLabs does not produce WAV output".to_string(),
            ));
        }

        debug!(
            "Sending TTS request to ElevenLabs ({} chars, voice {})",
            text.chars().count(),
            voice_id
        );

        let url = format!("{}/text-to-speech/{}", API_BASE, voice_id);
        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&json!({
                "text": text,
                "model_id": self.config.model_id,
                "voice_settings": {
                    "stability": self.config.stability,
                    "similarity_boost": self.config.similarity_boost,
                },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = match response.text().await {
                Ok(text) => text,
                Err(e) => format!("Failed to read error response: {}", e),
            };
            error!("ElevenLabs API error (status {}): {}", status, error_text);
            return Err(map_status_error(
                ProviderKind::ElevenLabs,
                status,
                &error_text,
                voice_id,
            ));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(AppError::ProviderUnavailable {
                provider: ProviderKind::ElevenLabs.to_string(),
                message: "received empty audio response".to_string(),
            });
        }

        Ok(bytes)
    }

    async fn validate_credentials(&self) -> AppResult<bool> {
        info!("Validating ElevenLabs API key");
        let response = self
            .client
            .get(format!("{}/user", API_BASE))
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_contains_default_voice() {
        let client =
            ElevenLabsClient::new("xi-test".to_string(), Duration::from_secs(30)).unwrap();
        let default = client.default_voice();
        assert!(client.voices().iter().any(|v| v.id == default));
    }
}
