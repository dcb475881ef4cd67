use serde::{Deserialize, Serialize};

pub mod tts;
pub use tts::ElevenLabsClient;

/// Конфигурация для ElevenLabs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevenLabsConfig {
    /// Модель синтеза
    pub model_id: String,
    /// Стабильность голоса (0.0 - 1.0)
    pub stability: f32,
    /// Похожесть на исходный голос (0.0 - 1.0)
    pub similarity_boost: f32,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            model_id: "eleven_multilingual_v2".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}
