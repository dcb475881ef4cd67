//! Основной файл библиотеки audionova
//!
//! Библиотека превращает рукопись в готовую к дистрибуции аудиокнигу:
//! режет текст на главы, дает пользователю проверить и переставить их,
//! озвучивает подтвержденные главы через взаимозаменяемых провайдеров
//! синтеза речи с цепочкой отказоустойчивости, собирает дорожки и
//! сводную дорожку книги и подбирает рекламный фрагмент.

pub mod api;
pub mod config;
pub mod errors;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use api::AudiobookService;
pub use config::{AppConfig, OutputFormat, ProviderKind};
pub use errors::{AppError, AppResult};
pub use models::{Chapter, ChapterReview, Job, JobStatus, RetailSample, Track};
pub use services::job::SubmitOptions;
pub use services::synthesis::ProgressUpdate;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::ProviderKind;
    use crate::models::{ChapterStatus, JobStatus, SegmentType, TrackStatus};
    use crate::services::job::SubmitOptions;
    use crate::services::tts::test_support::MockProvider;
    use crate::services::tts::TtsProvider;
    use crate::storage::MemoryObjectStore;
    use crate::{AppConfig, AppError, AudiobookService, ChapterReview};

    const MANUSCRIPT: &str = "Preface\n\nThis book took a long winter to write, and it shows.\n\nChapter 1\n\nIt was a dark and stormy night. The rain fell in torrents. \"Run!\" she shouted, and he bolted for the door without looking back.\n\nAbout the Author\n\nThe author lives by the sea with two dogs and an old typewriter.";

    fn test_service() -> AudiobookService {
        let mut config = AppConfig::default();
        config.use_caching = false;
        config.sample_min_words = 5;
        config.sample_max_words = 100;
        config.base_backoff_ms = 1;
        let store = Arc::new(MemoryObjectStore::new());
        AudiobookService::with_provider_factory(
            config,
            store,
            Arc::new(|kind, _config| {
                Ok(Arc::new(MockProvider::new(kind).with_max_chars(120))
                    as Arc<dyn TtsProvider>)
            }),
        )
        .unwrap()
    }

    fn submit_options() -> SubmitOptions {
        SubmitOptions {
            provider_priority: vec![ProviderKind::OpenAi, ProviderKind::ElevenLabs],
            voices: vec!["mock-voice".to_string()],
            ..SubmitOptions::default()
        }
    }

    #[tokio::test]
    async fn full_pipeline_three_chapter_manuscript() {
        let service = test_service();

        let job = service
            .submit("user-1", MANUSCRIPT, submit_options())
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::ChaptersPending);

        let chapters = service.get_chapters(job.id).unwrap();
        assert_eq!(chapters.len(), 3);
        let body_count = chapters
            .iter()
            .filter(|c| c.segment_type == SegmentType::BodyChapter)
            .count();
        assert_eq!(body_count, 1);

        let approved = service.approve(job.id).await.unwrap();
        assert_eq!(approved.status, JobStatus::Processing);

        service.wait_for_synthesis(job.id).await.unwrap();

        let finished = service.get_job(job.id).unwrap();
        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.progress_percent, 100.0);
        assert!(finished.completed_at.is_some());
        assert!(finished.total_duration_secs.is_some());

        // Три дорожки глав плюс сводная, индексы 0..3
        let tracks = service.get_tracks(job.id).unwrap();
        assert_eq!(tracks.len(), 4);
        for (i, track) in tracks.iter().enumerate() {
            assert_eq!(track.track_index, i);
            assert_eq!(track.status, TrackStatus::Completed);
        }
        assert!(tracks[3].chapter_id.is_none());

        // Кандидаты рекламного фрагмента созданы после завершения
        let samples = service.get_retail_samples(job.id).unwrap();
        assert!(!samples.is_empty());

        // Стоимость учтена за единственного реально вызванного провайдера
        let cost = service.get_job_cost(job.id);
        assert!(cost.total_usd > 0.0);
        assert!(cost.by_provider.contains_key("openai"));
        assert!(!cost.by_provider.contains_key("elevenlabs"));
    }

    #[tokio::test]
    async fn approve_rejects_job_without_body_chapters() {
        let service = test_service();
        let job = service
            .submit("user-1", MANUSCRIPT, submit_options())
            .await
            .unwrap();

        // Переводим единственную основную главу во вводные материалы
        let chapters = service.get_chapters(job.id).unwrap();
        let body = chapters
            .iter()
            .find(|c| c.segment_type == SegmentType::BodyChapter)
            .unwrap();
        service
            .review_chapter(
                job.id,
                body.id,
                ChapterReview {
                    segment_type: Some(SegmentType::FrontMatter),
                    ..ChapterReview::default()
                },
            )
            .unwrap();

        let err = service.approve(job.id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // Задача осталась в chapters_pending
        assert_eq!(
            service.get_job(job.id).unwrap().status,
            JobStatus::ChaptersPending
        );
    }

    #[tokio::test]
    async fn reorder_keeps_contiguous_order() {
        let service = test_service();
        let job = service
            .submit("user-1", MANUSCRIPT, submit_options())
            .await
            .unwrap();

        let chapters = service.get_chapters(job.id).unwrap();
        let last = chapters.last().unwrap();

        // Переносим последнюю главу в начало
        let reordered = service
            .review_chapter(
                job.id,
                last.id,
                ChapterReview {
                    new_position: Some(0),
                    ..ChapterReview::default()
                },
            )
            .unwrap();

        assert_eq!(reordered[0].id, last.id);
        let mut orders: Vec<usize> = reordered.iter().map(|c| c.current_order).collect();
        orders.sort_unstable();
        assert_eq!(orders, vec![0, 1, 2]);

        // Исключение главы не рвет непрерывность порядка
        let excluded_id = reordered[1].id;
        let after_exclude = service
            .review_chapter(
                job.id,
                excluded_id,
                ChapterReview {
                    included: Some(false),
                    ..ChapterReview::default()
                },
            )
            .unwrap();
        let mut orders: Vec<usize> = after_exclude.iter().map(|c| c.current_order).collect();
        orders.sort_unstable();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn fallback_attributes_cost_to_successful_provider() {
        let mut config = AppConfig::default();
        config.use_caching = false;
        config.sample_min_words = 5;
        config.sample_max_words = 100;
        config.base_backoff_ms = 1;
        config.max_retries_per_provider = 1;
        let store = Arc::new(MemoryObjectStore::new());

        // Первый провайдер в приоритете всегда падает, второй работает
        let service = AudiobookService::with_provider_factory(
            config,
            store,
            Arc::new(|kind, _config| {
                let provider: Arc<dyn TtsProvider> = match kind {
                    ProviderKind::OpenAi => {
                        Arc::new(MockProvider::failing_retryably(kind).with_max_chars(120))
                    }
                    _ => Arc::new(MockProvider::new(kind).with_max_chars(120)),
                };
                Ok(provider)
            }),
        )
        .unwrap();

        let job = service
            .submit("user-1", MANUSCRIPT, submit_options())
            .await
            .unwrap();
        service.approve(job.id).await.unwrap();
        service.wait_for_synthesis(job.id).await.unwrap();

        assert_eq!(service.get_job(job.id).unwrap().status, JobStatus::Completed);

        let cost = service.get_job_cost(job.id);
        assert!(cost.by_provider.contains_key("elevenlabs"));
        assert!(!cost.by_provider.contains_key("openai"));
    }

    #[tokio::test]
    async fn failed_job_retries_to_completion() {
        let mut config = AppConfig::default();
        config.use_caching = false;
        config.sample_min_words = 5;
        config.sample_max_words = 100;
        config.base_backoff_ms = 1;
        config.max_retries_per_provider = 0;
        let store = Arc::new(MemoryObjectStore::new());

        // Единственный провайдер падает на первом прогоне целиком
        // (в рукописи 4 куска), потом восстанавливается
        let flaky = Arc::new(MockProvider::failing_first(ProviderKind::OpenAi, 4).with_max_chars(120));
        let flaky_for_factory = flaky.clone();
        let service = AudiobookService::with_provider_factory(
            config,
            store,
            Arc::new(move |_kind, _config| {
                Ok(flaky_for_factory.clone() as Arc<dyn TtsProvider>)
            }),
        )
        .unwrap();

        let options = SubmitOptions {
            provider_priority: vec![ProviderKind::OpenAi],
            voices: vec!["mock-voice".to_string()],
            ..SubmitOptions::default()
        };
        let job = service.submit("user-1", MANUSCRIPT, options).await.unwrap();
        service.approve(job.id).await.unwrap();
        service.wait_for_synthesis(job.id).await.unwrap();

        let failed = service.get_job(job.id).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error_message.is_some());

        let retried = service.retry(job.id).await.unwrap();
        assert_eq!(retried.status, JobStatus::Processing);
        assert_eq!(retried.retry_count, 1);
        assert!(retried.error_message.is_none());

        service.wait_for_synthesis(job.id).await.unwrap();
        assert_eq!(service.get_job(job.id).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_stops_processing_job() {
        let mut config = AppConfig::default();
        config.use_caching = false;
        config.base_backoff_ms = 1;
        let store = Arc::new(MemoryObjectStore::new());

        // Медленный провайдер, чтобы отмена пришла во время синтеза
        let service = AudiobookService::with_provider_factory(
            config,
            store,
            Arc::new(|kind, _config| {
                Ok(Arc::new(
                    MockProvider::new(kind)
                        .with_max_chars(120)
                        .with_delay(std::time::Duration::from_millis(300)),
                ) as Arc<dyn TtsProvider>)
            }),
        )
        .unwrap();

        let job = service
            .submit("user-1", MANUSCRIPT, submit_options())
            .await
            .unwrap();
        service.approve(job.id).await.unwrap();

        let cancelled = service.cancel(job.id).unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        // Незавершенные главы исключены из выпуска
        let chapters = service.get_chapters(job.id).unwrap();
        for chapter in chapters {
            assert!(matches!(
                chapter.status,
                ChapterStatus::Excluded | ChapterStatus::Completed
            ));
        }

        // Повторная отмена отклоняется
        assert!(service.cancel(job.id).is_err());
    }

    #[tokio::test]
    async fn submit_rejects_empty_manuscript() {
        let service = test_service();
        let err = service
            .submit("user-1", "   ", submit_options())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
