use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Тип структурной единицы книги
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    /// Вступительные титры
    OpeningCredits,
    /// Вводные материалы (посвящение, предисловие, пролог)
    FrontMatter,
    /// Основная глава
    BodyChapter,
    /// Заключительные материалы (эпилог, приложения)
    BackMatter,
    /// Бонусный материал или тизер
    Bonus,
    /// Заключительные титры
    ClosingCredits,
    /// Рекламный фрагмент
    RetailSample,
}

impl SegmentType {
    /// Суффикс для экспортного имени файла
    pub fn filename_suffix(&self) -> &'static str {
        match self {
            SegmentType::OpeningCredits => "opening_credits",
            SegmentType::FrontMatter => "front_matter",
            SegmentType::BodyChapter => "chapter",
            SegmentType::BackMatter => "back_matter",
            SegmentType::Bonus => "bonus",
            SegmentType::ClosingCredits => "closing_credits",
            SegmentType::RetailSample => "retail_sample",
        }
    }
}

/// Статус главы
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    /// Ожидает проверки пользователем
    PendingReview,
    /// Подтверждена для озвучивания
    Approved,
    /// Исключена из выпуска
    Excluded,
    /// Идет синтез речи
    Processing,
    /// Озвучена
    Completed,
    /// Синтез не удался
    Failed,
}

/// Глава рукописи
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: Uuid,
    pub job_id: Uuid,

    /// Позиция, определенная при разбиении рукописи
    pub source_order: usize,

    /// Текущая позиция после перестановок пользователя.
    /// В рамках задачи образует непрерывную последовательность 0..N-1.
    pub current_order: usize,

    pub title: String,

    /// Путь к тексту главы в хранилище объектов
    pub text_path: String,

    pub word_count: usize,

    /// Оценка длительности начитки в секундах
    pub estimated_duration_secs: f64,

    pub segment_type: SegmentType,

    pub status: ChapterStatus,

    /// Сообщение об ошибке синтеза
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Chapter {
    /// Глава входит в выпуск
    pub fn is_included(&self) -> bool {
        self.status != ChapterStatus::Excluded
    }

    /// Глава входит в выпуск и является основной главой
    pub fn is_included_body(&self) -> bool {
        self.is_included() && self.segment_type == SegmentType::BodyChapter
    }
}

/// Изменения главы, запрошенные пользователем при проверке
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChapterReview {
    /// Новая позиция в книге
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_position: Option<usize>,

    /// Новый тип сегмента
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_type: Option<SegmentType>,

    /// Включить или исключить главу из выпуска
    #[serde(skip_serializing_if = "Option::is_none")]
    pub included: Option<bool>,

    /// Новое название
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}
