// TTS services module
// Contains the uniform provider abstraction and the supported backends

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, OutputFormat, ProviderKind};
use crate::errors::{AppError, AppResult};

pub mod azure;
pub mod cache;
pub mod cost;
pub mod elevenlabs;
pub mod fallback;
pub mod openai;
pub mod rate_limiter;
#[cfg(test)]
pub mod test_support;

pub use cache::SynthesisCache;
pub use cost::CostTracker;
pub use fallback::{synthesize_with_fallback, FallbackPolicy, SynthesisOutcome};
pub use rate_limiter::RateLimiter;

use azure::AzureTtsClient;
use elevenlabs::ElevenLabsClient;
use openai::OpenAiTtsClient;

/// Голос из каталога провайдера
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    /// Идентификатор голоса у провайдера
    pub id: String,

    /// Отображаемое имя
    pub name: String,

    /// Код языка (например "en", "ru")
    pub language: String,

    /// Описание или дополнительные сведения
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Trait that all TTS providers must implement
#[async_trait::async_trait]
pub trait TtsProvider: Send + Sync {
    /// Какой это провайдер
    fn kind(&self) -> ProviderKind;

    /// Каталог доступных голосов
    fn voices(&self) -> Vec<Voice>;

    /// Голос по умолчанию (используется при переходе по цепочке
    /// отказоустойчивости, когда запрошенный голос чужой)
    fn default_voice(&self) -> &'static str;

    /// Стоимость за 1000 символов в долларах
    fn cost_per_1000_chars(&self) -> f64;

    /// Безопасный предел запросов в минуту, заявленный провайдером
    fn max_requests_per_minute(&self) -> u32;

    /// Максимальная длина текста одного запроса в символах
    fn max_input_chars(&self) -> usize;

    /// Сгенерировать речь, вернуть аудио в запрошенном формате.
    /// Провайдер, не умеющий формат, отвечает ошибкой конфигурации.
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        format: OutputFormat,
    ) -> AppResult<Bytes>;

    /// Проверить учетные данные провайдера
    async fn validate_credentials(&self) -> AppResult<bool>;
}

/// Get the appropriate TTS provider client based on the kind
pub fn get_provider(kind: ProviderKind, config: &AppConfig) -> AppResult<Arc<dyn TtsProvider>> {
    let provider_config = config.providers.get(kind);
    if !provider_config.is_usable() {
        return Err(AppError::Configuration(format!(
            "Provider {} is not configured",
            kind
        )));
    }

    let timeout = std::time::Duration::from_secs(config.provider_call_timeout_secs);

    match kind {
        ProviderKind::OpenAi => Ok(Arc::new(OpenAiTtsClient::new(
            provider_config.api_key.clone(),
            timeout,
        )?)),
        ProviderKind::ElevenLabs => Ok(Arc::new(ElevenLabsClient::new(
            provider_config.api_key.clone(),
            timeout,
        )?)),
        ProviderKind::Azure => Ok(Arc::new(AzureTtsClient::new(
            provider_config.api_key.clone(),
            provider_config
                .region
                .clone()
                .unwrap_or_else(|| "eastus".to_string()),
            timeout,
        )?)),
    }
}

/// Get the list of providers configured for use
pub fn available_providers(config: &AppConfig) -> Vec<ProviderKind> {
    config.providers.usable()
}

/// Заявленный провайдером безопасный предел запросов в минуту
///
/// Известен заранее по виду провайдера, чтобы лимитер можно было
/// построить при старте процесса без создания клиентов.
pub fn declared_rpm(kind: ProviderKind) -> u32 {
    match kind {
        ProviderKind::OpenAi => 50,
        ProviderKind::ElevenLabs => 20,
        ProviderKind::Azure => 120,
    }
}

/// Выбрать голос для провайдера: запрошенный, если он есть в каталоге,
/// иначе голос провайдера по умолчанию
pub fn resolve_voice(provider: &dyn TtsProvider, requested: &str) -> String {
    if provider.voices().iter().any(|v| v.id == requested) {
        requested.to_string()
    } else {
        provider.default_voice().to_string()
    }
}

/// Преобразовать HTTP-ответ провайдера с ошибкой в ошибку приложения
///
/// 429 и 5xx считаются временными сбоями, 400/422 - отказом по
/// содержимому или голосу, 401/403 - ошибкой конфигурации ключа.
pub fn map_status_error(
    kind: ProviderKind,
    status: reqwest::StatusCode,
    body: &str,
    voice_id: &str,
) -> AppError {
    if status.as_u16() == 429 {
        return AppError::RateLimited {
            provider: kind.to_string(),
        };
    }
    if status.is_server_error() {
        return AppError::ProviderUnavailable {
            provider: kind.to_string(),
            message: format!("status {}: {}", status, body),
        };
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return AppError::Configuration(format!(
            "Provider {} rejected credentials (status {})",
            kind, status
        ));
    }
    if status.as_u16() == 400 || status.as_u16() == 422 {
        let lowered = body.to_lowercase();
        if lowered.contains("voice") {
            return AppError::InvalidVoice {
                provider: kind.to_string(),
                voice: voice_id.to_string(),
            };
        }
        return AppError::ContentRejected {
            provider: kind.to_string(),
            message: body.to_string(),
        };
    }
    AppError::ProviderUnavailable {
        provider: kind.to_string(),
        message: format!("unexpected status {}: {}", status, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn status_mapping_taxonomy() {
        let err = map_status_error(ProviderKind::OpenAi, StatusCode::TOO_MANY_REQUESTS, "", "alloy");
        assert!(err.is_retryable());

        let err = map_status_error(ProviderKind::OpenAi, StatusCode::BAD_GATEWAY, "oops", "alloy");
        assert!(err.is_retryable());

        let err = map_status_error(
            ProviderKind::ElevenLabs,
            StatusCode::BAD_REQUEST,
            "unknown voice id",
            "bad-voice",
        );
        assert!(!err.is_retryable());
        assert!(matches!(err, AppError::InvalidVoice { .. }));

        let err = map_status_error(
            ProviderKind::Azure,
            StatusCode::BAD_REQUEST,
            "content policy violation",
            "en-US-JennyNeural",
        );
        assert!(matches!(err, AppError::ContentRejected { .. }));
    }
}
