use serde::{Deserialize, Serialize};

pub mod tts;
pub use tts::OpenAiTtsClient;

/// Модель OpenAI TTS
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OpenAiModel {
    /// Стандартная модель
    Standard,
    /// Модель высокого качества
    HighDefinition,
}

impl Default for OpenAiModel {
    fn default() -> Self {
        Self::Standard
    }
}

impl OpenAiModel {
    /// Получить строковое представление модели
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "tts-1",
            Self::HighDefinition => "tts-1-hd",
        }
    }
}

/// Конфигурация для OpenAI TTS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Модель для генерации речи
    pub model: OpenAiModel,
    /// Скорость речи (0.25 - 4.0)
    pub speed: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: OpenAiModel::default(),
            speed: 1.0,
        }
    }
}
