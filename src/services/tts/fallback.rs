//! Цепочка отказоустойчивости синтеза
//!
//! Провайдеры перебираются в порядке приоритета. Временные сбои
//! (таймауты, 5xx, отказы лимитера) повторяются с экспоненциальным
//! отступом, после исчерпания повторов происходит переход к следующему
//! провайдеру. Невременные ошибки (неверный голос, отклоненное
//! содержимое) прерывают цепочку сразу.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{error, info, warn};
use rand::Rng;

use crate::config::{AppConfig, OutputFormat, ProviderKind};
use crate::errors::{AppError, AppResult};

use super::rate_limiter::RateLimiter;
use super::{resolve_voice, TtsProvider};

/// Параметры повторов и ожидания лимитера
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    /// Количество повторов одного провайдера после первой попытки
    pub max_retries_per_provider: u32,
    /// Базовая задержка экспоненциального отступа
    pub base_backoff: Duration,
    /// Таймаут ожидания токена лимитера
    pub rate_limit_timeout: Duration,
}

impl From<&AppConfig> for FallbackPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_retries_per_provider: config.max_retries_per_provider,
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            rate_limit_timeout: Duration::from_secs(config.rate_limit_acquire_timeout_secs),
        }
    }
}

/// Результат успешного синтеза
#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    /// Провайдер, фактически сгенерировавший аудио
    pub provider: ProviderKind,
    /// Фактически использованный голос
    pub voice: String,
    /// Аудио
    pub audio: Bytes,
    /// Количество оплачиваемых символов
    pub characters_billed: usize,
}

/// Синтез с перебором провайдеров по приоритету
pub async fn synthesize_with_fallback(
    text: &str,
    requested_voice: &str,
    format: OutputFormat,
    providers: &[Arc<dyn TtsProvider>],
    rate_limiter: &RateLimiter,
    policy: &FallbackPolicy,
) -> AppResult<SynthesisOutcome> {
    if providers.is_empty() {
        return Err(AppError::Configuration(
            "No synthesis providers configured".to_string(),
        ));
    }

    let characters = text.chars().count();
    let mut last_error: Option<AppError> = None;

    for provider in providers {
        let kind = provider.kind();
        let voice = resolve_voice(provider.as_ref(), requested_voice);

        for attempt in 0..=policy.max_retries_per_provider {
            if attempt > 0 {
                let backoff = backoff_with_jitter(policy.base_backoff, attempt);
                warn!(
                    "Retrying {} after failure (attempt {}, backoff {:?})",
                    kind,
                    attempt + 1,
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }

            if let Err(e) = rate_limiter.acquire(kind, policy.rate_limit_timeout).await {
                warn!("Rate limit wait failed for {}: {}", kind, e);
                last_error = Some(e);
                continue;
            }

            match provider.synthesize(text, &voice, format).await {
                Ok(audio) => {
                    info!(
                        "Synthesized {} chars via {} (voice {})",
                        characters, kind, voice
                    );
                    return Ok(SynthesisOutcome {
                        provider: kind,
                        voice,
                        audio,
                        characters_billed: characters,
                    });
                }
                Err(e) if e.is_retryable() => {
                    warn!("Retryable failure from {}: {}", kind, e);
                    last_error = Some(e);
                }
                Err(e) => {
                    // Невременная ошибка: без повторов и без перехода
                    // к следующему провайдеру
                    error!("Non-retryable failure from {}: {}", kind, e);
                    return Err(e);
                }
            }
        }

        warn!("Provider {} exhausted its retry budget, falling through", kind);
    }

    let detail = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no providers attempted".to_string());
    Err(AppError::SynthesisFailed(format!(
        "all providers in the priority list failed, last error: {}",
        detail
    )))
}

/// Экспоненциальный отступ со случайной добавкой
fn backoff_with_jitter(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt - 1));
    let jitter_ms = if base.as_millis() > 1 {
        let cap = (base.as_millis() / 2) as u64;
        rand::thread_rng().gen_range(0..cap.max(1))
    } else {
        0
    };
    exp + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tts::test_support::MockProvider;

    const FORMAT: OutputFormat = OutputFormat::Mp3 { bitrate_kbps: 128 };

    fn quick_policy() -> FallbackPolicy {
        FallbackPolicy {
            max_retries_per_provider: 2,
            base_backoff: Duration::from_millis(1),
            rate_limit_timeout: Duration::from_millis(100),
        }
    }

    fn limiter_for(kinds: &[ProviderKind]) -> RateLimiter {
        let limits: Vec<(ProviderKind, u32)> = kinds.iter().map(|k| (*k, 600)).collect();
        RateLimiter::new(&limits)
    }

    #[tokio::test]
    async fn first_provider_success() {
        let provider = Arc::new(MockProvider::new(ProviderKind::OpenAi));
        let providers: Vec<Arc<dyn TtsProvider>> = vec![provider.clone()];
        let limiter = limiter_for(&[ProviderKind::OpenAi]);

        let outcome = synthesize_with_fallback(
            "hello",
            "mock-voice",
            FORMAT,
            &providers,
            &limiter,
            &quick_policy(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.provider, ProviderKind::OpenAi);
        assert_eq!(outcome.characters_billed, 5);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn falls_through_to_second_provider() {
        // Первый провайдер всегда отвечает таймаутом
        let failing = Arc::new(MockProvider::failing_retryably(ProviderKind::OpenAi));
        let healthy = Arc::new(MockProvider::new(ProviderKind::ElevenLabs));
        let providers: Vec<Arc<dyn TtsProvider>> = vec![failing.clone(), healthy.clone()];
        let limiter = limiter_for(&[ProviderKind::OpenAi, ProviderKind::ElevenLabs]);

        let outcome = synthesize_with_fallback(
            "some text",
            "mock-voice",
            FORMAT,
            &providers,
            &limiter,
            &quick_policy(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.provider, ProviderKind::ElevenLabs);
        // Первый провайдер использовал все попытки: 1 + 2 повтора
        assert_eq!(failing.call_count(), 3);
        assert_eq!(healthy.call_count(), 1);
    }

    #[tokio::test]
    async fn non_retryable_error_aborts_without_fallback() {
        let rejecting = Arc::new(MockProvider::rejecting_voice(ProviderKind::OpenAi));
        let healthy = Arc::new(MockProvider::new(ProviderKind::ElevenLabs));
        let providers: Vec<Arc<dyn TtsProvider>> = vec![rejecting.clone(), healthy.clone()];
        let limiter = limiter_for(&[ProviderKind::OpenAi, ProviderKind::ElevenLabs]);

        let err = synthesize_with_fallback(
            "text",
            "mock-voice",
            FORMAT,
            &providers,
            &limiter,
            &quick_policy(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::InvalidVoice { .. }));
        assert_eq!(rejecting.call_count(), 1);
        assert_eq!(healthy.call_count(), 0);
    }

    #[tokio::test]
    async fn all_providers_exhausted() {
        let a = Arc::new(MockProvider::failing_retryably(ProviderKind::OpenAi));
        let b = Arc::new(MockProvider::failing_retryably(ProviderKind::ElevenLabs));
        let providers: Vec<Arc<dyn TtsProvider>> = vec![a, b];
        let limiter = limiter_for(&[ProviderKind::OpenAi, ProviderKind::ElevenLabs]);

        let err = synthesize_with_fallback(
            "text",
            "mock-voice",
            FORMAT,
            &providers,
            &limiter,
            &quick_policy(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::SynthesisFailed(_)));
    }

    #[tokio::test]
    async fn foreign_voice_resolves_to_default() {
        let provider = Arc::new(MockProvider::new(ProviderKind::Azure));
        let providers: Vec<Arc<dyn TtsProvider>> = vec![provider];
        let limiter = limiter_for(&[ProviderKind::Azure]);

        let outcome = synthesize_with_fallback(
            "text",
            "voice-from-another-provider",
            FORMAT,
            &providers,
            &limiter,
            &quick_policy(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.voice, "mock-voice");
    }
}
