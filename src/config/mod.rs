// Configuration module
// Centralized management of application configuration

use serde::{Deserialize, Serialize};

pub mod providers;

pub use providers::{ProviderConfig, ProviderKind, ProvidersConfig};

/// Формат аудио на выходе
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase", tag = "format")]
pub enum OutputFormat {
    /// MP3 с указанным битрейтом (кбит/с)
    Mp3 { bitrate_kbps: u32 },
    /// Несжатый WAV
    Wav,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Mp3 { bitrate_kbps: 128 }
    }
}

impl OutputFormat {
    /// Расширение файла для формата
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 { .. } => "mp3",
            OutputFormat::Wav => "wav",
        }
    }
}

/// Весовые коэффициенты итоговой оценки рекламного фрагмента
///
/// Итоговая оценка считается как
/// `engagement * engagement_weight + intensity * intensity_weight +
/// (1 - spoiler_risk) * spoiler_weight`. Значения по умолчанию подобраны
/// вручную и могут настраиваться без изменения кода.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SampleWeights {
    pub engagement_weight: f32,
    pub intensity_weight: f32,
    pub spoiler_weight: f32,
}

impl Default for SampleWeights {
    fn default() -> Self {
        Self {
            engagement_weight: 0.40,
            intensity_weight: 0.35,
            spoiler_weight: 0.25,
        }
    }
}

/// Конфигурация приложения
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Настройки провайдеров синтеза речи
    pub providers: ProvidersConfig,

    /// Темп начитки в словах в минуту (для оценки длительности глав)
    #[serde(default = "default_narration_rate")]
    pub narration_rate_wpm: u32,

    /// Максимальный размер рукописи в байтах
    #[serde(default = "default_max_manuscript_bytes")]
    pub max_manuscript_bytes: usize,

    /// Максимальное количество одновременных запросов синтеза в рамках задачи
    #[serde(default = "default_job_concurrency")]
    pub max_concurrent_chunks_per_job: usize,

    /// Глобальный предел одновременных запросов синтеза
    #[serde(default = "default_global_concurrency")]
    pub max_concurrent_chunks_global: usize,

    /// Количество повторов одного провайдера до перехода к следующему
    #[serde(default = "default_max_retries")]
    pub max_retries_per_provider: u32,

    /// Базовая задержка экспоненциального отступа (мс)
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Таймаут одного запроса к провайдеру (секунды)
    #[serde(default = "default_provider_timeout")]
    pub provider_call_timeout_secs: u64,

    /// Таймаут ожидания токена лимитера запросов (секунды)
    #[serde(default = "default_rate_limit_timeout")]
    pub rate_limit_acquire_timeout_secs: u64,

    /// Предельное общее время выполнения задачи (секунды)
    #[serde(default = "default_job_wall_clock")]
    pub job_wall_clock_secs: u64,

    /// Формат выходного аудио
    #[serde(default)]
    pub output_format: OutputFormat,

    /// Использовать кэширование результатов синтеза
    #[serde(default = "default_use_caching")]
    pub use_caching: bool,

    /// Директория для кэша (по умолчанию системная временная)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,

    /// Максимальный размер кэша в байтах
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cache_size: Option<u64>,

    /// Минимальная длина рекламного фрагмента в словах
    #[serde(default = "default_sample_min_words")]
    pub sample_min_words: usize,

    /// Максимальная длина рекламного фрагмента в словах
    #[serde(default = "default_sample_max_words")]
    pub sample_max_words: usize,

    /// Весовые коэффициенты оценки рекламных фрагментов
    #[serde(default)]
    pub sample_weights: SampleWeights,
}

fn default_narration_rate() -> u32 {
    150
}

fn default_max_manuscript_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_job_concurrency() -> usize {
    4
}

fn default_global_concurrency() -> usize {
    12
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_provider_timeout() -> u64 {
    60
}

fn default_rate_limit_timeout() -> u64 {
    30
}

fn default_job_wall_clock() -> u64 {
    4 * 60 * 60
}

fn default_use_caching() -> bool {
    true
}

fn default_sample_min_words() -> usize {
    400
}

fn default_sample_max_words() -> usize {
    900
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            providers: ProvidersConfig::default(),
            narration_rate_wpm: default_narration_rate(),
            max_manuscript_bytes: default_max_manuscript_bytes(),
            max_concurrent_chunks_per_job: default_job_concurrency(),
            max_concurrent_chunks_global: default_global_concurrency(),
            max_retries_per_provider: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            provider_call_timeout_secs: default_provider_timeout(),
            rate_limit_acquire_timeout_secs: default_rate_limit_timeout(),
            job_wall_clock_secs: default_job_wall_clock(),
            output_format: OutputFormat::default(),
            use_caching: default_use_caching(),
            cache_dir: None,
            max_cache_size: Some(1024 * 1024 * 1024), // 1 GB
            sample_min_words: default_sample_min_words(),
            sample_max_words: default_sample_max_words(),
            sample_weights: SampleWeights::default(),
        }
    }
}

impl AppConfig {
    /// Создать конфигурацию с ключами провайдеров из переменных окружения
    pub fn from_env() -> Self {
        Self {
            providers: ProvidersConfig::from_env(),
            ..Self::default()
        }
    }
}
