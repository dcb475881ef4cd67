//! Вспомогательный провайдер для тестов

use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;

use crate::config::{OutputFormat, ProviderKind};
use crate::errors::{AppError, AppResult};

use super::{TtsProvider, Voice};

/// Сценарий поведения мок-провайдера
enum Behavior {
    /// Отвечать аудио, повторяющим текст запроса
    EchoText,
    /// Всегда отвечать временной ошибкой
    FailRetryably,
    /// Всегда отвечать ошибкой неверного голоса
    RejectVoice,
    /// Временные ошибки первые N вызовов, затем успех
    FailFirst(usize),
}

/// Мок-провайдер со счетчиком вызовов
pub struct MockProvider {
    kind: ProviderKind,
    behavior: Behavior,
    calls: AtomicUsize,
    max_chars: usize,
    delay: Option<std::time::Duration>,
    delay_per_char: Option<std::time::Duration>,
}

impl MockProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            behavior: Behavior::EchoText,
            calls: AtomicUsize::new(0),
            max_chars: 200,
            delay: None,
            delay_per_char: None,
        }
    }

    pub fn failing_retryably(kind: ProviderKind) -> Self {
        Self {
            behavior: Behavior::FailRetryably,
            ..Self::new(kind)
        }
    }

    pub fn rejecting_voice(kind: ProviderKind) -> Self {
        Self {
            behavior: Behavior::RejectVoice,
            ..Self::new(kind)
        }
    }

    pub fn failing_first(kind: ProviderKind, failures: usize) -> Self {
        Self {
            behavior: Behavior::FailFirst(failures),
            ..Self::new(kind)
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Задержка перед ответом (для тестов отмены)
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Задержка, пропорциональная длине текста: длинные куски
    /// завершаются позже коротких, порядок завершения получается
    /// обратным порядку разбиения
    pub fn with_delay_per_char(mut self, per_char: std::time::Duration) -> Self {
        self.delay_per_char = Some(per_char);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TtsProvider for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn voices(&self) -> Vec<Voice> {
        vec![Voice {
            id: "mock-voice".to_string(),
            name: "Mock".to_string(),
            language: "en".to_string(),
            description: None,
        }]
    }

    fn default_voice(&self) -> &'static str {
        "mock-voice"
    }

    fn cost_per_1000_chars(&self) -> f64 {
        0.01
    }

    fn max_requests_per_minute(&self) -> u32 {
        600
    }

    fn max_input_chars(&self) -> usize {
        self.max_chars
    }

    async fn synthesize(
        &self,
        text: &str,
        _voice_id: &str,
        _format: OutputFormat,
    ) -> AppResult<Bytes> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(per_char) = self.delay_per_char {
            tokio::time::sleep(per_char * text.chars().count() as u32).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::EchoText => Ok(Bytes::from(format!("[{}]", text))),
            Behavior::FailRetryably => Err(AppError::ProviderUnavailable {
                provider: self.kind.to_string(),
                message: "simulated timeout".to_string(),
            }),
            Behavior::RejectVoice => Err(AppError::InvalidVoice {
                provider: self.kind.to_string(),
                voice: "mock-voice".to_string(),
            }),
            Behavior::FailFirst(failures) => {
                if call < *failures {
                    Err(AppError::ProviderUnavailable {
                        provider: self.kind.to_string(),
                        message: "simulated transient failure".to_string(),
                    })
                } else {
                    Ok(Bytes::from(format!("[{}]", text)))
                }
            }
        }
    }

    async fn validate_credentials(&self) -> AppResult<bool> {
        Ok(true)
    }
}
