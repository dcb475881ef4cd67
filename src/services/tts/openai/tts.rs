use std::time::Duration;

use bytes::Bytes;
use log::{debug, error, info};
use reqwest::Client;
use serde_json::json;

use super::OpenAiConfig;
use crate::config::{OutputFormat, ProviderKind};
use crate::errors::{AppError, AppResult};
use crate::services::tts::{map_status_error, TtsProvider, Voice};

const SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";
const MODELS_URL: &str = "https://api.openai.com/v1/models";

/// Клиент для работы с OpenAI TTS API
pub struct OpenAiTtsClient {
    client: Client,
    api_key: String,
    config: OpenAiConfig,
}

impl OpenAiTtsClient {
    /// Создает новый клиент OpenAI TTS
    pub fn new(api_key: String, timeout: Duration) -> AppResult<Self> {
        if api_key.trim().is_empty() {
            return Err(AppError::Configuration(
                "OpenAI API key is required".to_string(),
            ));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            config: OpenAiConfig::default(),
        })
    }

    /// Клиент с нестандартной моделью или скоростью речи
    pub fn with_config(api_key: String, timeout: Duration, config: OpenAiConfig) -> AppResult<Self> {
        let mut client = Self::new(api_key, timeout)?;
        client.config = config;
        Ok(client)
    }
}

#[async_trait::async_trait]
impl TtsProvider for OpenAiTtsClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn voices(&self) -> Vec<Voice> {
        ["alloy", "echo", "fable", "onyx", "nova", "shimmer"]
            .iter()
            .map(|id| Voice {
                id: id.to_string(),
                name: {
                    let mut name = id.to_string();
                    name[..1].make_ascii_uppercase();
                    name
                },
                language: "multi".to_string(),
                description: None,
            })
            .collect()
    }

    fn default_voice(&self) -> &'static str {
        "nova"
    }

    fn cost_per_1000_chars(&self) -> f64 {
        0.015
    }

    fn max_requests_per_minute(&self) -> u32 {
        crate::services::tts::declared_rpm(ProviderKind::OpenAi)
    }

    fn max_input_chars(&self) -> usize {
        4096
    }

    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        format: OutputFormat,
    ) -> AppResult<Bytes> {
        debug!(
            "Sending TTS request to OpenAI ({} chars, voice {})",
            text.chars().count(),
            voice_id
        );

        let response_format = match format {
            OutputFormat::Mp3 { .. } => "mp3",
            OutputFormat::Wav => "wav",
        };

        let response = self
            .client
            .post(SPEECH_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.config.model.as_str(),
                "voice": voice_id,
                "input": text,
                "response_format": response_format,
                "speed": self.config.speed,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = match response.text().await {
                Ok(text) => text,
                Err(e) => format!("Failed to read error response: {}", e),
            };
            error!("OpenAI API error (status {}): {}", status, error_text);
            return Err(map_status_error(
                ProviderKind::OpenAi,
                status,
                &error_text,
                voice_id,
            ));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(AppError::ProviderUnavailable {
                provider: ProviderKind::OpenAi.to_string(),
                message: "received empty audio response".to_string(),
            });
        }

        Ok(bytes)
    }

    async fn validate_credentials(&self) -> AppResult<bool> {
        info!("Validating OpenAI API key");
        let response = self
            .client
            .get(MODELS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
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
            OpenAiTtsClient::new("sk-test".to_string(), Duration::from_secs(30)).unwrap();
        let default = client.default_voice();
        assert!(client.voices().iter().any(|v| v.id == default));
        assert_eq!(client.voices().len(), 6);
    }

    #[test]
    fn empty_key_rejected() {
        assert!(OpenAiTtsClient::new("  ".to_string(), Duration::from_secs(30)).is_err());
    }
}
