// Error handling module
// Contains custom error types and error handling utilities

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError;

/// Ошибки приложения
#[derive(Debug, Error, Serialize)]
pub enum AppError {
    /// Ошибка валидации входных данных (состояние задачи не меняется)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Недопустимый переход состояния задачи
    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Запись не найдена
    #[error("Not found: {0}")]
    NotFound(String),

    /// Провайдер временно недоступен (таймаут, 5xx, сетевая ошибка)
    #[error("Provider {provider} unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    /// Провайдер отклонил запрос из-за превышения лимита запросов
    #[error("Provider {provider} rate limited")]
    RateLimited { provider: String },

    /// Истек таймаут ожидания токена лимитера запросов
    #[error("Timed out waiting for a {provider} rate limit slot")]
    RateLimitTimeout { provider: String },

    /// Неизвестный или недоступный голос
    #[error("Provider {provider} rejected voice '{voice}'")]
    InvalidVoice { provider: String, voice: String },

    /// Провайдер отклонил содержимое запроса
    #[error("Provider {provider} rejected content: {message}")]
    ContentRejected { provider: String, message: String },

    /// Генерация речи не удалась после перебора всех провайдеров
    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(String),

    /// Ошибка обработки аудио
    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    /// Ошибка хранилища объектов
    #[error("Object storage error: {0}")]
    Storage(String),

    /// Операция отменена
    #[error("Operation cancelled")]
    Cancelled,

    /// Превышено общее время выполнения задачи
    #[error("Job timed out: {0}")]
    JobTimeout(String),

    /// Ошибка ввода/вывода
    #[error("IO error: {0}")]
    #[serde(serialize_with = "serialize_io_error")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Другая ошибка
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    #[serde(skip)]
    Anyhow(#[from] anyhow::Error),
}

// Функция для сериализации std::io::Error, которая не реализует serde::Serialize
fn serialize_io_error<S>(err: &std::io::Error, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&err.to_string())
}

impl AppError {
    /// Можно ли повторить операцию после этой ошибки
    ///
    /// Повторяемыми считаются временные сбои провайдера: таймауты,
    /// ответы 5xx, отказы из-за превышения лимита запросов и истечение
    /// ожидания токена лимитера.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ProviderUnavailable { .. }
                | AppError::RateLimited { .. }
                | AppError::RateLimitTimeout { .. }
        )
    }
}

// Сетевые ошибки reqwest считаем временными сбоями провайдера.
// Ответы с конкретными статусами клиенты провайдеров разбирают сами.
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ProviderUnavailable {
            provider: "network".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Other(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Other(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl<T> From<SendError<T>> for AppError {
    fn from(err: SendError<T>) -> Self {
        AppError::Other(format!("Failed to send message: {}", err))
    }
}

// Result type alias for application
pub type AppResult<T> = Result<T, AppError>;
