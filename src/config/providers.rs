use serde::{Deserialize, Serialize};

// Доступные провайдеры синтеза речи
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    ElevenLabs,
    Azure,
}

impl ProviderKind {
    /// Строковое имя провайдера
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::ElevenLabs => "elevenlabs",
            ProviderKind::Azure => "azure",
        }
    }

    /// Все поддерживаемые провайдеры
    pub fn all() -> &'static [ProviderKind] {
        &[
            ProviderKind::OpenAi,
            ProviderKind::ElevenLabs,
            ProviderKind::Azure,
        ]
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "elevenlabs" => Ok(ProviderKind::ElevenLabs),
            "azure" => Ok(ProviderKind::Azure),
            other => Err(format!("Unsupported TTS provider: {}", other)),
        }
    }
}

/// Настройки одного провайдера синтеза речи
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API ключ
    #[serde(default)]
    pub api_key: String,

    /// Провайдер включен и участвует в цепочке отказоустойчивости
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Переопределение предела запросов в минуту.
    /// Не может превышать заявленный провайдером максимум, при превышении
    /// значение обрезается до него.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_per_minute_override: Option<u32>,

    /// Регион сервиса (используется Azure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            enabled: true,
            requests_per_minute_override: None,
            region: None,
        }
    }
}

impl ProviderConfig {
    /// Провайдер настроен и может использоваться
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.api_key.trim().is_empty()
    }
}

/// Настройки всех поддерживаемых провайдеров
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub elevenlabs: ProviderConfig,
    #[serde(default)]
    pub azure: ProviderConfig,
}

impl ProvidersConfig {
    /// Настройки конкретного провайдера
    pub fn get(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::ElevenLabs => &self.elevenlabs,
            ProviderKind::Azure => &self.azure,
        }
    }

    /// Провайдеры, настроенные для использования, в стабильном порядке
    pub fn usable(&self) -> Vec<ProviderKind> {
        ProviderKind::all()
            .iter()
            .copied()
            .filter(|kind| self.get(*kind).is_usable())
            .collect()
    }

    /// Загрузить ключи из переменных окружения
    ///
    /// Используются OPENAI_API_KEY, ELEVENLABS_API_KEY, AZURE_SPEECH_KEY
    /// и AZURE_SPEECH_REGION.
    pub fn from_env() -> Self {
        Self {
            openai: ProviderConfig {
                api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
                ..ProviderConfig::default()
            },
            elevenlabs: ProviderConfig {
                api_key: std::env::var("ELEVENLABS_API_KEY").unwrap_or_default(),
                ..ProviderConfig::default()
            },
            azure: ProviderConfig {
                api_key: std::env::var("AZURE_SPEECH_KEY").unwrap_or_default(),
                region: std::env::var("AZURE_SPEECH_REGION").ok(),
                ..ProviderConfig::default()
            },
        }
    }
}
