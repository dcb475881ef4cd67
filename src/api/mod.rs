// API module
// The boundary consumed by the presentation layer: exposes exactly the
// pipeline operations plus polling-style status reads

use std::sync::Arc;

use tokio::sync::mpsc::Sender;
use uuid::Uuid;

use crate::config::{AppConfig, ProviderKind};
use crate::errors::AppResult;
use crate::models::{Chapter, ChapterReview, Job, RetailSample, Track};
use crate::services::job::{JobService, ProviderFactory, SubmitOptions};
use crate::services::sample;
use crate::services::synthesis::{ProgressUpdate, WorkerPool};
use crate::services::tts::{
    available_providers, cost::JobCost, get_provider, CostTracker, RateLimiter, SynthesisCache,
    Voice,
};
use crate::storage::{JobRepository, ObjectStore};

/// Фасад конвейера аудиокниг
///
/// Собирает сервисы и общие ресурсы процесса: репозиторий записей,
/// лимитер запросов, журнал стоимости, кэш синтеза и пул воркеров.
/// Лимитер и журнал стоимости общие для всех задач, остальное состояние
/// принадлежит задачам.
pub struct AudiobookService {
    config: AppConfig,
    repo: Arc<JobRepository>,
    store: Arc<dyn ObjectStore>,
    cost_tracker: Arc<CostTracker>,
    jobs: JobService,
}

impl AudiobookService {
    /// Создать сервис с фабрикой провайдеров по умолчанию
    ///
    /// Должен создаваться внутри tokio-рантайма: лимитер запросов
    /// запускает фоновые задачи пополнения.
    pub fn new(config: AppConfig, store: Arc<dyn ObjectStore>) -> AppResult<Self> {
        Self::with_provider_factory(config, store, Arc::new(|kind, config| {
            get_provider(kind, config)
        }))
    }

    /// Создать сервис с нестандартной фабрикой провайдеров
    pub fn with_provider_factory(
        config: AppConfig,
        store: Arc<dyn ObjectStore>,
        factory: ProviderFactory,
    ) -> AppResult<Self> {
        let repo = Arc::new(JobRepository::new());
        let rate_limiter = Arc::new(RateLimiter::from_config(&config));
        let cost_tracker = Arc::new(CostTracker::new());
        let cache = if config.use_caching {
            Some(Arc::new(SynthesisCache::new(&config)?))
        } else {
            None
        };

        let pool = Arc::new(WorkerPool::new(
            config.clone(),
            repo.clone(),
            store.clone(),
            rate_limiter,
            cost_tracker.clone(),
            cache,
        ));

        let jobs = JobService::new(config.clone(), repo.clone(), store.clone(), pool)
            .with_provider_factory(factory);

        Ok(Self {
            config,
            repo,
            store,
            cost_tracker,
            jobs,
        })
    }

    /// Принять рукопись и создать задачу
    pub async fn submit(
        &self,
        user_id: &str,
        manuscript: &str,
        options: SubmitOptions,
    ) -> AppResult<Job> {
        self.jobs.submit(user_id, manuscript, options).await
    }

    /// Текущее состояние задачи (для опроса статуса)
    pub fn get_job(&self, job_id: Uuid) -> AppResult<Job> {
        self.repo.get_job(job_id)
    }

    /// Главы задачи в текущем порядке
    pub fn get_chapters(&self, job_id: Uuid) -> AppResult<Vec<Chapter>> {
        self.repo.get_chapters(job_id)
    }

    /// Применить правки главы
    pub fn review_chapter(
        &self,
        job_id: Uuid,
        chapter_id: Uuid,
        changes: ChapterReview,
    ) -> AppResult<Vec<Chapter>> {
        self.jobs.review_chapter(job_id, chapter_id, changes)
    }

    /// Подтвердить главы и запустить озвучивание
    pub async fn approve(&self, job_id: Uuid) -> AppResult<Job> {
        self.jobs.approve(job_id, None).await
    }

    /// Подтвердить главы с подпиской на обновления прогресса
    pub async fn approve_with_progress(
        &self,
        job_id: Uuid,
        progress: Sender<ProgressUpdate>,
    ) -> AppResult<Job> {
        self.jobs.approve(job_id, Some(progress)).await
    }

    /// Отменить задачу
    pub fn cancel(&self, job_id: Uuid) -> AppResult<Job> {
        self.jobs.cancel(job_id)
    }

    /// Повторно запустить задачу после ошибки
    pub async fn retry(&self, job_id: Uuid) -> AppResult<Job> {
        self.jobs.retry(job_id, None).await
    }

    /// Дорожки задачи в порядке воспроизведения
    pub fn get_tracks(&self, job_id: Uuid) -> AppResult<Vec<Track>> {
        self.repo.get_tracks(job_id)
    }

    /// Кандидаты рекламного фрагмента, лучшие первыми
    pub fn get_retail_samples(&self, job_id: Uuid) -> AppResult<Vec<RetailSample>> {
        self.repo.get_samples(job_id)
    }

    /// Подтвердить финальный рекламный фрагмент
    pub fn confirm_retail_sample(
        &self,
        job_id: Uuid,
        sample_id: Uuid,
    ) -> AppResult<RetailSample> {
        sample::confirm_sample(&self.repo, job_id, sample_id)
    }

    /// Перегенерировать кандидатов рекламного фрагмента
    ///
    /// Неподтвержденные кандидаты отбрасываются, финальный сохраняется.
    pub async fn regenerate_retail_samples(&self, job_id: Uuid) -> AppResult<usize> {
        sample::generate_samples(job_id, &self.repo, self.store.as_ref(), &self.config).await
    }

    /// Текущая стоимость задачи по журналу
    pub fn get_job_cost(&self, job_id: Uuid) -> JobCost {
        self.cost_tracker.job_cost(job_id)
    }

    /// Провайдеры, настроенные для использования
    pub fn get_available_providers(&self) -> Vec<ProviderKind> {
        available_providers(&self.config)
    }

    /// Каталог голосов провайдера
    pub fn get_voices(&self, kind: ProviderKind) -> AppResult<Vec<Voice>> {
        let provider = get_provider(kind, &self.config)?;
        Ok(provider.voices())
    }

    /// Дождаться завершения фонового озвучивания задачи
    pub async fn wait_for_synthesis(&self, job_id: Uuid) -> AppResult<()> {
        self.jobs.wait_for_synthesis(job_id).await
    }
}
