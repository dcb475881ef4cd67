//! Машина состояний задачи
//!
//! Ведет задачу по жизненному циклу: pending → parsing →
//! chapters_pending → chapters_approved → processing → completed, с
//! failed и cancelled из любого нетерминального состояния и повторным
//! запуском из failed. Пауза между сегментацией и подтверждением глав
//! не удерживается в памяти: состояние chapters_pending сохраняется в
//! хранилище, а approve() может прийти сколь угодно позже.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{AppConfig, OutputFormat, ProviderKind};
use crate::errors::{AppError, AppResult};
use crate::models::{
    Chapter, ChapterReview, ChapterStatus, Job, JobStatus, SynthesisMode,
};
use crate::services::segmenter::segment_manuscript;
use crate::services::synthesis::{ProgressUpdate, WorkerPool};
use crate::services::text::clean_text;
use crate::services::tts::{get_provider, TtsProvider};
use crate::storage::{JobRepository, ObjectStore};

/// Фабрика клиентов провайдеров (подменяется в тестах)
pub type ProviderFactory =
    Arc<dyn Fn(ProviderKind, &AppConfig) -> AppResult<Arc<dyn TtsProvider>> + Send + Sync>;

/// Параметры новой задачи
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitOptions {
    /// Режим озвучивания
    #[serde(default)]
    pub synthesis_mode: SynthesisMode,

    /// Провайдеры в порядке приоритета (пусто - все настроенные)
    #[serde(default)]
    pub provider_priority: Vec<ProviderKind>,

    /// Идентификаторы голосов (первый - рассказчик)
    #[serde(default)]
    pub voices: Vec<String>,

    /// Формат выходного аудио
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,
}

/// Разрешен ли переход между статусами задачи
///
/// Переходы монотонны, исключения только у явного повтора (failed →
/// pending → processing) и отмены.
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    match (from, to) {
        (Pending, Parsing) => true,
        (Parsing, ChaptersPending) => true,
        (ChaptersPending, ChaptersApproved) => true,
        (ChaptersApproved, Processing) => true,
        (Processing, Completed) => true,
        // Путь повторного запуска
        (Failed, Pending) => true,
        (Pending, Processing) => true,
        (from, Failed) | (from, Cancelled) => !from.is_terminal(),
        _ => false,
    }
}

struct JobHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Сервис управления задачами
pub struct JobService {
    config: AppConfig,
    repo: Arc<JobRepository>,
    store: Arc<dyn ObjectStore>,
    pool: Arc<WorkerPool>,
    provider_factory: ProviderFactory,
    active: Mutex<HashMap<Uuid, JobHandle>>,
}

impl JobService {
    pub fn new(
        config: AppConfig,
        repo: Arc<JobRepository>,
        store: Arc<dyn ObjectStore>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            config,
            repo,
            store,
            pool,
            provider_factory: Arc::new(|kind, config| get_provider(kind, config)),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Подменить фабрику провайдеров (для тестов)
    pub fn with_provider_factory(mut self, factory: ProviderFactory) -> Self {
        self.provider_factory = factory;
        self
    }

    /// Принять рукопись и создать задачу
    ///
    /// Проверяет размер и формат, сохраняет рукопись в хранилище,
    /// прогоняет подготовку текста и сегментацию. Успех оставляет
    /// задачу в chapters_pending, ошибка разбора - в failed.
    pub async fn submit(
        &self,
        user_id: &str,
        manuscript: &str,
        options: SubmitOptions,
    ) -> AppResult<Job> {
        if manuscript.trim().is_empty() {
            return Err(AppError::Validation("manuscript is empty".to_string()));
        }
        if manuscript.len() > self.config.max_manuscript_bytes {
            return Err(AppError::Validation(format!(
                "manuscript is larger than the {} byte limit",
                self.config.max_manuscript_bytes
            )));
        }

        let provider_priority = if options.provider_priority.is_empty() {
            self.config.providers.usable()
        } else {
            options.provider_priority.clone()
        };

        let mut job = Job::new(user_id, String::new());
        job.synthesis_mode = options.synthesis_mode;
        job.provider_priority = provider_priority;
        job.voices = options.voices;
        job.output_format = options.output_format.unwrap_or(self.config.output_format);
        job.manuscript_path = format!("jobs/{}/manuscript.txt", job.id);
        let job_id = job.id;

        self.store
            .put(&job.manuscript_path, Bytes::from(manuscript.to_string()))
            .await?;
        self.repo.insert_job(job);
        info!("Job {} submitted by user {}", job_id, user_id);

        self.transition(job_id, JobStatus::Parsing)?;

        match self.parse_manuscript(job_id, manuscript).await {
            Ok(chapter_count) => {
                info!("Job {} parsed into {} chapters", job_id, chapter_count);
                self.transition(job_id, JobStatus::ChaptersPending)
            }
            Err(e) => {
                error!("Job {} failed to parse: {}", job_id, e);
                let message = e.to_string();
                self.repo.modify_job(job_id, |job| {
                    job.status = JobStatus::Failed;
                    job.error_message = Some(message.clone());
                })?;
                Err(e)
            }
        }
    }

    /// Подготовка текста и сегментация рукописи
    async fn parse_manuscript(&self, job_id: Uuid, manuscript: &str) -> AppResult<usize> {
        let cleaned = clean_text(manuscript);
        if cleaned.is_empty() {
            return Err(AppError::Validation(
                "manuscript contains no readable text".to_string(),
            ));
        }

        let segments = segment_manuscript(&cleaned, self.config.narration_rate_wpm);

        let mut chapters = Vec::with_capacity(segments.len());
        for segment in segments {
            let chapter_id = Uuid::new_v4();
            let text_path = format!("jobs/{}/chapters/{}.txt", job_id, chapter_id);
            self.store
                .put(&text_path, Bytes::from(segment.text))
                .await?;

            chapters.push(Chapter {
                id: chapter_id,
                job_id,
                source_order: segment.source_order,
                current_order: segment.source_order,
                title: segment.title,
                text_path,
                word_count: segment.word_count,
                estimated_duration_secs: segment.estimated_duration_secs,
                segment_type: segment.segment_type,
                status: ChapterStatus::PendingReview,
                error_message: None,
            });
        }

        let count = chapters.len();
        self.repo.set_chapters(job_id, chapters);
        Ok(count)
    }

    /// Применить правки главы, сделанные пользователем при проверке
    ///
    /// Допустимо только пока задача в chapters_pending. Порядок глав
    /// после любой перестановки заново нормализуется в непрерывную
    /// последовательность 0..N-1.
    pub fn review_chapter(
        &self,
        job_id: Uuid,
        chapter_id: Uuid,
        changes: ChapterReview,
    ) -> AppResult<Vec<Chapter>> {
        let job = self.repo.get_job(job_id)?;
        if job.status != JobStatus::ChaptersPending {
            return Err(AppError::Validation(format!(
                "chapter review is only allowed while chapters are pending, job is {}",
                job.status.as_str()
            )));
        }

        self.repo.modify_chapters(job_id, |chapters| {
            if !chapters.iter().any(|c| c.id == chapter_id) {
                return Err(AppError::NotFound(format!("chapter {}", chapter_id)));
            }

            for chapter in chapters.iter_mut() {
                if chapter.id != chapter_id {
                    continue;
                }
                if let Some(title) = &changes.title {
                    chapter.title = title.clone();
                }
                if let Some(segment_type) = changes.segment_type {
                    chapter.segment_type = segment_type;
                }
                if let Some(included) = changes.included {
                    chapter.status = if included {
                        ChapterStatus::PendingReview
                    } else {
                        ChapterStatus::Excluded
                    };
                }
            }

            if let Some(new_position) = changes.new_position {
                let mut order: Vec<Uuid> = {
                    let mut sorted: Vec<&Chapter> = chapters.iter().collect();
                    sorted.sort_by_key(|c| c.current_order);
                    sorted.iter().map(|c| c.id).collect()
                };
                let from = order
                    .iter()
                    .position(|id| *id == chapter_id)
                    .expect("chapter existence checked above");
                let id = order.remove(from);
                let target = new_position.min(order.len());
                order.insert(target, id);

                for (index, id) in order.iter().enumerate() {
                    if let Some(chapter) = chapters.iter_mut().find(|c| c.id == *id) {
                        chapter.current_order = index;
                    }
                }
            } else {
                normalize_order(chapters);
            }

            Ok(())
        })??;

        self.repo.get_chapters(job_id)
    }

    /// Подтвердить главы и запустить озвучивание
    ///
    /// Требует хотя бы одну включенную основную главу, иначе задача
    /// остается в chapters_pending с ошибкой валидации.
    pub async fn approve(
        &self,
        job_id: Uuid,
        progress: Option<Sender<ProgressUpdate>>,
    ) -> AppResult<Job> {
        let job = self.repo.get_job(job_id)?;
        if job.status != JobStatus::ChaptersPending {
            return Err(AppError::Validation(format!(
                "approve is only allowed while chapters are pending, job is {}",
                job.status.as_str()
            )));
        }

        let chapters = self.repo.get_chapters(job_id)?;
        let body_count = chapters.iter().filter(|c| c.is_included_body()).count();
        if body_count == 0 {
            return Err(AppError::Validation(
                "at least one included body chapter is required for approval".to_string(),
            ));
        }

        // Провайдеры проверяются до смены состояния
        let providers = self.resolve_providers(&job)?;

        self.repo.modify_chapters(job_id, |chapters| {
            for chapter in chapters.iter_mut() {
                if chapter.status == ChapterStatus::PendingReview {
                    chapter.status = ChapterStatus::Approved;
                }
            }
        })?;

        self.transition(job_id, JobStatus::ChaptersApproved)?;
        self.transition(job_id, JobStatus::Processing)?;
        let job = self.repo.modify_job(job_id, |job| {
            job.started_at = Some(chrono::Utc::now());
            job.clone()
        })?;

        self.spawn_synthesis(job_id, providers, progress);
        Ok(job)
    }

    /// Отменить задачу
    ///
    /// Допустимо в pending, parsing и processing. Останавливает
    /// незавершенный синтез, невыполненные главы помечаются
    /// исключенными, уже оплаченные записи стоимости не отменяются.
    pub fn cancel(&self, job_id: Uuid) -> AppResult<Job> {
        let job = self.repo.get_job(job_id)?;
        if !matches!(
            job.status,
            JobStatus::Pending | JobStatus::Parsing | JobStatus::Processing
        ) {
            return Err(AppError::Validation(format!(
                "cancel is not allowed while job is {}",
                job.status.as_str()
            )));
        }

        if let Some(handle) = self.active.lock().unwrap().remove(&job_id) {
            handle.cancel.cancel();
            handle.task.abort();
        }

        self.repo.modify_chapters(job_id, |chapters| {
            for chapter in chapters.iter_mut() {
                if chapter.is_included() && chapter.status != ChapterStatus::Completed {
                    chapter.status = ChapterStatus::Excluded;
                }
            }
        })?;

        let job = self.repo.modify_job(job_id, |job| {
            job.status = JobStatus::Cancelled;
            job.clone()
        })?;
        info!("Job {} cancelled", job_id);
        Ok(job)
    }

    /// Повторный запуск после ошибки
    ///
    /// Сбрасывает незавершенные главы и их дорожки, увеличивает счетчик
    /// повторов, очищает сообщение об ошибке и возобновляет синтез.
    /// Готовые главы не переозвучиваются.
    pub async fn retry(
        &self,
        job_id: Uuid,
        progress: Option<Sender<ProgressUpdate>>,
    ) -> AppResult<Job> {
        let job = self.repo.get_job(job_id)?;
        if job.status != JobStatus::Failed {
            return Err(AppError::Validation(format!(
                "retry is only allowed from failed, job is {}",
                job.status.as_str()
            )));
        }

        let providers = self.resolve_providers(&job)?;

        self.transition(job_id, JobStatus::Pending)?;
        self.repo.modify_job(job_id, |job| {
            job.retry_count += 1;
            job.error_message = None;
        })?;

        // Сбрасываем только то, что не дошло до конца
        let reset_ids: Vec<Uuid> = self.repo.modify_chapters(job_id, |chapters| {
            let mut reset = Vec::new();
            for chapter in chapters.iter_mut() {
                if chapter.is_included() && chapter.status != ChapterStatus::Completed {
                    chapter.status = ChapterStatus::Approved;
                    chapter.error_message = None;
                    reset.push(chapter.id);
                }
            }
            reset
        })?;
        self.repo.modify_tracks(job_id, |tracks| {
            tracks.retain(|t| match t.chapter_id {
                Some(chapter_id) => !reset_ids.contains(&chapter_id),
                None => false,
            });
        })?;

        let job = self.transition(job_id, JobStatus::Processing)?;
        self.spawn_synthesis(job_id, providers, progress);
        info!("Job {} retrying (attempt {})", job_id, job.retry_count);
        Ok(job)
    }

    /// Дождаться завершения фонового озвучивания (для тестов и
    /// аккуратной остановки процесса)
    pub async fn wait_for_synthesis(&self, job_id: Uuid) -> AppResult<()> {
        let handle = self.active.lock().unwrap().remove(&job_id);
        if let Some(handle) = handle {
            handle
                .task
                .await
                .map_err(|e| AppError::Other(format!("synthesis task failed: {}", e)))?;
        }
        Ok(())
    }

    fn resolve_providers(&self, job: &Job) -> AppResult<Vec<Arc<dyn TtsProvider>>> {
        let kinds = if job.provider_priority.is_empty() {
            self.config.providers.usable()
        } else {
            job.provider_priority.clone()
        };

        let mut providers = Vec::new();
        for kind in kinds {
            match (self.provider_factory)(kind, &self.config) {
                Ok(provider) => providers.push(provider),
                Err(e) => warn!("Skipping provider {}: {}", kind, e),
            }
        }

        if providers.is_empty() {
            return Err(AppError::Configuration(
                "no usable synthesis providers for this job".to_string(),
            ));
        }
        Ok(providers)
    }

    fn spawn_synthesis(
        &self,
        job_id: Uuid,
        providers: Vec<Arc<dyn TtsProvider>>,
        progress: Option<Sender<ProgressUpdate>>,
    ) {
        let cancel = CancellationToken::new();
        let pool = self.pool.clone();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            if let Err(e) = pool.run_job(job_id, providers, task_cancel, progress).await {
                error!("Job {} synthesis run ended with error: {}", job_id, e);
            }
        });

        self.active
            .lock()
            .unwrap()
            .insert(job_id, JobHandle { cancel, task });
    }

    fn transition(&self, job_id: Uuid, to: JobStatus) -> AppResult<Job> {
        self.repo.modify_job(job_id, |job| {
            if !can_transition(job.status, to) {
                return Err(AppError::InvalidTransition {
                    from: job.status.as_str().to_string(),
                    to: to.as_str().to_string(),
                });
            }
            job.status = to;
            Ok(job.clone())
        })?
    }
}

/// Нормализовать порядок глав в непрерывную последовательность 0..N-1
pub fn normalize_order(chapters: &mut [Chapter]) {
    let order: Vec<Uuid> = {
        let mut sorted: Vec<&Chapter> = chapters.iter().collect();
        sorted.sort_by_key(|c| c.current_order);
        sorted.iter().map(|c| c.id).collect()
    };
    for (index, id) in order.iter().enumerate() {
        if let Some(chapter) = chapters.iter_mut().find(|c| c.id == *id) {
            chapter.current_order = index;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table() {
        use JobStatus::*;
        assert!(can_transition(Pending, Parsing));
        assert!(can_transition(Parsing, ChaptersPending));
        assert!(can_transition(ChaptersPending, ChaptersApproved));
        assert!(can_transition(ChaptersApproved, Processing));
        assert!(can_transition(Processing, Completed));
        assert!(can_transition(Processing, Failed));
        assert!(can_transition(Failed, Pending));
        assert!(can_transition(Parsing, Cancelled));

        assert!(!can_transition(Completed, Processing));
        assert!(!can_transition(Cancelled, Pending));
        assert!(!can_transition(Completed, Failed));
        assert!(!can_transition(ChaptersPending, Processing));
        assert!(!can_transition(Parsing, Pending));
    }
}
