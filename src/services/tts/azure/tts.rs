use std::time::Duration;

use bytes::Bytes;
use log::{debug, error, info};
use reqwest::Client;

use super::AzureConfig;
use crate::config::{OutputFormat, ProviderKind};
use crate::errors::{AppError, AppResult};
use crate::services::tts::{map_status_error, TtsProvider, Voice};

/// Нейронные голоса Azure Speech
const VOICES: &[(&str, &str, &str)] = &[
    ("en-US-JennyNeural", "Jenny", "en-US"),
    ("en-US-GuyNeural", "Guy", "en-US"),
    ("en-US-AriaNeural", "Aria", "en-US"),
    ("en-US-DavisNeural", "Davis", "en-US"),
    ("en-GB-SoniaNeural", "Sonia", "en-GB"),
];

/// Клиент для работы с Azure Speech API
pub struct AzureTtsClient {
    client: Client,
    api_key: String,
    region: String,
    config: AzureConfig,
}

impl AzureTtsClient {
    /// Создает новый клиент Azure Speech
    pub fn new(api_key: String, region: String, timeout: Duration) -> AppResult<Self> {
        if api_key.trim().is_empty() {
            return Err(AppError::Configuration(
                "Azure Speech key is required".to_string(),
            ));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            region,
            config: AzureConfig::default(),
        })
    }

    fn synthesis_url(&self) -> String {
        format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
            self.region
        )
    }

    fn token_url(&self) -> String {
        format!(
            "https://{}.api.cognitive.microsoft.com/sts/v1.0/issueToken",
            self.region
        )
    }

    /// Собрать SSML-документ запроса
    fn build_ssml(&self, text: &str, voice_id: &str) -> String {
        format!(
            "<speak version='1.0' xml:lang='{lang}'><voice name='{voice}'>{text}</voice></speak>",
            lang = self.config.language,
            voice = voice_id,
            text = escape_xml(text),
        )
    }
}

/// Экранирование специальных символов XML
fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[async_trait::async_trait]
impl TtsProvider for AzureTtsClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn voices(&self) -> Vec<Voice> {
        VOICES
            .iter()
            .map(|(id, name, language)| Voice {
                id: id.to_string(),
                name: name.to_string(),
                language: language.to_string(),
                description: None,
            })
            .collect()
    }

    fn default_voice(&self) -> &'static str {
        "en-US-JennyNeural"
    }

    fn cost_per_1000_chars(&self) -> f64 {
        0.016
    }

    fn max_requests_per_minute(&self) -> u32 {
        crate::services::tts::declared_rpm(ProviderKind::Azure)
    }

    fn max_input_chars(&self) -> usize {
        5000
    }

    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        format: OutputFormat,
    ) -> AppResult<Bytes> {
        debug!(
            "Sending TTS request to Azure Speech ({} chars, voice {})",
            text.chars().count(),
            voice_id
        );

        let output_format = match format {
            OutputFormat::Mp3 { .. } => self.config.output_format.as_str(),
            OutputFormat::Wav => "riff-24khz-16bit-mono-pcm",
        };

        let ssml = self.build_ssml(text, voice_id);
        let response = self
            .client
            .post(self.synthesis_url())
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", output_format)
            .header("User-Agent", "audionova")
            .body(ssml)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = match response.text().await {
                Ok(text) => text,
                Err(e) => format!("Failed to read error response: {}", e),
            };
            error!("Azure Speech API error (status {}): {}", status, error_text);
            return Err(map_status_error(
                ProviderKind::Azure,
                status,
                &error_text,
                voice_id,
            ));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(AppError::ProviderUnavailable {
                provider: ProviderKind::Azure.to_string(),
                message: "received empty audio response".to_string(),
            });
        }

        Ok(bytes)
    }

    async fn validate_credentials(&self) -> AppResult<bool> {
        info!("Validating Azure Speech key");
        let response = self
            .client
            .post(self.token_url())
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("Content-Length", "0")
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssml_escapes_markup() {
        let client = AzureTtsClient::new(
            "key".to_string(),
            "eastus".to_string(),
            Duration::from_secs(30),
        )
        .unwrap();
        let ssml = client.build_ssml("Tom & Jerry <3", "en-US-JennyNeural");
        assert!(ssml.contains("Tom &amp; Jerry &lt;3"));
        assert!(ssml.contains("en-US-JennyNeural"));
    }

    #[test]
    fn catalog_contains_default_voice() {
        let client = AzureTtsClient::new(
            "key".to_string(),
            "westeurope".to_string(),
            Duration::from_secs(30),
        )
        .unwrap();
        let default = client.default_voice();
        assert!(client.voices().iter().any(|v| v.id == default));
    }
}
