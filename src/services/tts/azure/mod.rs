use serde::{Deserialize, Serialize};

pub mod tts;
pub use tts::AzureTtsClient;

/// Конфигурация для Azure Speech
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    /// Формат выходного аудио
    pub output_format: String,
    /// Язык SSML-обертки
    pub language: String,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            output_format: "audio-24khz-96kbitrate-mono-mp3".to_string(),
            language: "en-US".to_string(),
        }
    }
}
