use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{OutputFormat, ProviderKind};

pub mod audio;
pub mod chapter;

pub use audio::{RetailSample, Track, TrackStatus};
pub use chapter::{Chapter, ChapterReview, ChapterStatus, SegmentType};

/// Статус жизненного цикла задачи
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Задача создана, рукопись еще не обработана
    Pending,
    /// Идет подготовка текста и разбиение на главы
    Parsing,
    /// Главы ждут проверки и подтверждения пользователем
    ChaptersPending,
    /// Главы подтверждены, синтез поставлен в очередь
    ChaptersApproved,
    /// Идет синтез речи
    Processing,
    /// Все главы озвучены, книга собрана
    Completed,
    /// Задача завершилась ошибкой
    Failed,
    /// Задача отменена пользователем
    Cancelled,
}

impl JobStatus {
    /// Терминальное состояние (из него нет переходов, кроме повтора из failed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Parsing => "parsing",
            JobStatus::ChaptersPending => "chapters_pending",
            JobStatus::ChaptersApproved => "chapters_approved",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

/// Режим озвучивания книги
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    /// Один рассказчик на всю книгу
    SingleNarrator,
    /// Два голоса: повествование и диалоги
    DualVoice,
    /// Отдельные голоса для персонажей
    MultiCharacter,
}

impl Default for SynthesisMode {
    fn default() -> Self {
        SynthesisMode::SingleNarrator
    }
}

/// Задача генерации аудиокниги
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Идентификатор задачи
    pub id: Uuid,

    /// Идентификатор пользователя-владельца (выдается внешней системой)
    pub user_id: String,

    /// Текущий статус
    pub status: JobStatus,

    /// Режим озвучивания
    #[serde(default)]
    pub synthesis_mode: SynthesisMode,

    /// Провайдеры в порядке приоритета для цепочки отказоустойчивости
    pub provider_priority: Vec<ProviderKind>,

    /// Идентификаторы голосов (первый - рассказчик)
    pub voices: Vec<String>,

    /// Формат выходного аудио
    #[serde(default)]
    pub output_format: OutputFormat,

    /// Прогресс выполнения (0.0 - 100.0), не убывает во время синтеза
    #[serde(default)]
    pub progress_percent: f32,

    /// Сообщение о первой неустранимой ошибке
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Количество повторных запусков
    #[serde(default)]
    pub retry_count: u32,

    /// Путь к рукописи в хранилище объектов
    pub manuscript_path: String,

    /// Итоговая длительность книги в секундах
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration_secs: Option<f64>,

    /// Итоговый размер аудио в байтах
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size_bytes: Option<u64>,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Создать новую задачу в состоянии pending
    pub fn new(user_id: impl Into<String>, manuscript_path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            status: JobStatus::Pending,
            synthesis_mode: SynthesisMode::default(),
            provider_priority: Vec::new(),
            voices: Vec::new(),
            output_format: OutputFormat::default(),
            progress_percent: 0.0,
            error_message: None,
            retry_count: 0,
            manuscript_path: manuscript_path.into(),
            total_duration_secs: None,
            total_size_bytes: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(!JobStatus::ChaptersPending.is_terminal());
    }

    #[test]
    fn new_job_defaults() {
        let job = Job::new("user-1", "manuscripts/book.txt");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress_percent, 0.0);
        assert_eq!(job.retry_count, 0);
        assert!(job.error_message.is_none());
    }
}
