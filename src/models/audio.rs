use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chapter::SegmentType;

/// Статус аудиодорожки
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Собранная аудиодорожка
///
/// Каждой включенной главе соответствует одна дорожка; после завершения
/// всех глав добавляется сводная дорожка всей книги (chapter_id = None).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: Uuid,
    pub job_id: Uuid,

    /// Исходная глава (None для сводной дорожки)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<Uuid>,

    /// Позиция в итоговом порядке воспроизведения
    pub track_index: usize,

    pub title: String,

    pub segment_type: SegmentType,

    /// Длительность в секундах
    pub duration_secs: f64,

    /// Размер файла в байтах
    pub file_size_bytes: u64,

    /// Экспортное имя файла, уникальное в рамках задачи
    pub export_filename: String,

    /// Путь к аудио в хранилище объектов
    pub audio_path: String,

    pub status: TrackStatus,
}

/// Кандидат рекламного фрагмента
///
/// Оценки лежат в диапазоне [0, 1]. Итоговая оценка складывается из
/// вовлеченности, эмоциональной насыщенности и штрафа за спойлеры с
/// настраиваемыми весами (см. SampleWeights в конфигурации).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetailSample {
    pub id: Uuid,
    pub job_id: Uuid,

    /// Глава, из которой извлечен фрагмент
    pub chapter_id: Uuid,

    /// Извлеченный текст
    pub text: String,

    /// Текст после правок пользователя
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_text: Option<String>,

    pub word_count: usize,

    /// Оценка вовлеченности
    pub engagement_score: f32,

    /// Оценка эмоциональной насыщенности
    pub emotional_intensity_score: f32,

    /// Риск спойлера (выше - хуже)
    pub spoiler_risk_score: f32,

    /// Итоговая оценка
    pub overall_score: f32,

    /// Фрагмент предложен автоматически
    #[serde(default)]
    pub is_auto_suggested: bool,

    /// Фрагмент подтвержден пользователем
    #[serde(default)]
    pub is_user_confirmed: bool,

    /// Финальный фрагмент выпуска (не более одного на задачу)
    #[serde(default)]
    pub is_final: bool,
}

impl RetailSample {
    /// Текст для озвучивания: правки пользователя имеют приоритет
    pub fn effective_text(&self) -> &str {
        self.edited_text.as_deref().unwrap_or(&self.text)
    }
}
