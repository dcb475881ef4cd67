//! Пул синтеза речи
//!
//! Ведет озвучивание подтвержденных глав задачи: режет текст главы на
//! куски под предел провайдера, синтезирует куски с ограниченным
//! параллелизмом, собирает аудио строго в порядке исходного разбиения
//! и обновляет прогресс задачи по завершении глав. Неудача одной главы
//! не останавливает остальные.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc::Sender, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{Chapter, ChapterStatus, Job, JobStatus, SegmentType, Track, TrackStatus};
use crate::services::assembler;
use crate::services::text::{split_into_chunks, TextChunk};
use crate::services::tts::{
    synthesize_with_fallback, CostTracker, FallbackPolicy, RateLimiter, SynthesisCache,
    TtsProvider,
};
use crate::storage::{JobRepository, ObjectStore};

/// Обновления о прогрессе озвучивания задачи
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProgressUpdate {
    /// Начало озвучивания
    Started,
    /// Глава озвучена
    ChapterCompleted { current: usize, total: usize },
    /// Глава не озвучена
    ChapterFailed { title: String },
    /// Сборка сводной дорожки
    AssemblingMaster,
    /// Озвучивание завершено
    Completed,
    /// Ошибка
    Error(String),
}

/// Пул воркеров синтеза, общий для процесса
pub struct WorkerPool {
    config: AppConfig,
    repo: Arc<JobRepository>,
    store: Arc<dyn ObjectStore>,
    rate_limiter: Arc<RateLimiter>,
    cost_tracker: Arc<CostTracker>,
    cache: Option<Arc<SynthesisCache>>,
    global_semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(
        config: AppConfig,
        repo: Arc<JobRepository>,
        store: Arc<dyn ObjectStore>,
        rate_limiter: Arc<RateLimiter>,
        cost_tracker: Arc<CostTracker>,
        cache: Option<Arc<SynthesisCache>>,
    ) -> Self {
        let global_semaphore = Arc::new(Semaphore::new(config.max_concurrent_chunks_global));
        Self {
            config,
            repo,
            store,
            rate_limiter,
            cost_tracker,
            cache,
            global_semaphore,
        }
    }

    /// Озвучить все подтвержденные главы задачи
    ///
    /// Возвращается после перехода задачи в completed, failed или
    /// cancelled. Общее время ограничено потолком из конфигурации, по
    /// его истечении задача принудительно переводится в failed.
    pub async fn run_job(
        self: Arc<Self>,
        job_id: Uuid,
        providers: Vec<Arc<dyn TtsProvider>>,
        cancel: CancellationToken,
        progress: Option<Sender<ProgressUpdate>>,
    ) -> AppResult<()> {
        let wall_clock = Duration::from_secs(self.config.job_wall_clock_secs);
        let pool = self.clone();
        let run = pool.run_job_inner(job_id, providers, cancel.clone(), progress.clone());

        match tokio::time::timeout(wall_clock, run).await {
            Ok(result) => result,
            Err(_) => {
                error!("Job {} exceeded the wall clock ceiling, aborting", job_id);
                cancel.cancel();
                let message = format!(
                    "job exceeded the {}s wall clock ceiling",
                    self.config.job_wall_clock_secs
                );
                self.repo.modify_job(job_id, |job| {
                    job.status = JobStatus::Failed;
                    job.error_message = Some(message.clone());
                })?;
                if let Some(sender) = &progress {
                    let _ = sender.send(ProgressUpdate::Error(message.clone())).await;
                }
                Err(AppError::JobTimeout(message))
            }
        }
    }

    async fn run_job_inner(
        self: Arc<Self>,
        job_id: Uuid,
        providers: Vec<Arc<dyn TtsProvider>>,
        cancel: CancellationToken,
        progress: Option<Sender<ProgressUpdate>>,
    ) -> AppResult<()> {
        if providers.is_empty() {
            return Err(AppError::Configuration(
                "job has no usable synthesis providers".to_string(),
            ));
        }

        let job = self.repo.get_job(job_id)?;
        let chapters = self.repo.get_chapters(job_id)?;

        let included: Vec<Chapter> = chapters.into_iter().filter(|c| c.is_included()).collect();
        let total = included.len();
        if total == 0 {
            return Err(AppError::Validation(
                "job has no included chapters to synthesize".to_string(),
            ));
        }

        // Индекс дорожки = позиция главы среди включенных глав
        let track_ranks: HashMap<Uuid, usize> = included
            .iter()
            .enumerate()
            .map(|(rank, chapter)| (chapter.id, rank))
            .collect();

        // Куски должны подходить каждому провайдеру цепочки
        let max_chars = providers
            .iter()
            .map(|p| p.max_input_chars())
            .min()
            .unwrap_or(1000);

        let completed_before = included
            .iter()
            .filter(|c| c.status == ChapterStatus::Completed)
            .count();
        let completed = Arc::new(AtomicUsize::new(completed_before));
        let used_filenames = Arc::new(Mutex::new(HashSet::new()));

        // Заново не озвучиваем уже готовые главы (повторный запуск)
        for track in self.repo.get_tracks(job_id)? {
            used_filenames
                .lock()
                .unwrap()
                .insert(track.export_filename.clone());
        }

        if let Some(sender) = &progress {
            let _ = sender.send(ProgressUpdate::Started).await;
        }

        let job_semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_chunks_per_job));
        let policy = FallbackPolicy::from(&self.config);

        let mut chapter_tasks = Vec::new();
        for chapter in included
            .iter()
            .filter(|c| c.status != ChapterStatus::Completed)
            .cloned()
        {
            let pool = self.clone();
            let job = job.clone();
            let providers = providers.clone();
            let cancel = cancel.clone();
            let progress = progress.clone();
            let completed = completed.clone();
            let job_semaphore = job_semaphore.clone();
            let used_filenames = used_filenames.clone();
            let policy = policy.clone();
            let track_rank = track_ranks[&chapter.id];

            chapter_tasks.push(tokio::spawn(async move {
                pool.process_chapter(
                    &job,
                    chapter,
                    track_rank,
                    total,
                    max_chars,
                    providers,
                    policy,
                    job_semaphore,
                    used_filenames,
                    completed,
                    cancel,
                    progress,
                )
                .await
            }));
        }

        for result in join_all(chapter_tasks).await {
            if let Err(e) = result {
                error!("Chapter task panicked: {}", e);
            }
        }

        if cancel.is_cancelled() {
            info!("Job {} synthesis stopped by cancellation", job_id);
            return Ok(());
        }

        self.finish_job(job_id, &job, total, progress).await
    }

    /// Финал задачи: либо сборка сводной дорожки и completed, либо
    /// failed с первой неустранимой ошибкой
    async fn finish_job(
        &self,
        job_id: Uuid,
        job: &Job,
        total: usize,
        progress: Option<Sender<ProgressUpdate>>,
    ) -> AppResult<()> {
        let chapters = self.repo.get_chapters(job_id)?;
        let included: Vec<&Chapter> = chapters.iter().filter(|c| c.is_included()).collect();
        let all_completed = included
            .iter()
            .all(|c| c.status == ChapterStatus::Completed);

        if !all_completed {
            let first_error = included
                .iter()
                .filter_map(|c| c.error_message.clone())
                .next()
                .unwrap_or_else(|| "one or more chapters failed to synthesize".to_string());
            self.repo.modify_job(job_id, |job| {
                job.status = JobStatus::Failed;
                job.error_message = Some(first_error.clone());
            })?;
            if let Some(sender) = &progress {
                let _ = sender.send(ProgressUpdate::Error(first_error)).await;
            }
            return Ok(());
        }

        if let Some(sender) = &progress {
            let _ = sender.send(ProgressUpdate::AssemblingMaster).await;
        }

        // Сводная дорожка: все дорожки глав в порядке воспроизведения
        let tracks: Vec<Track> = self
            .repo
            .get_tracks(job_id)?
            .into_iter()
            .filter(|t| t.chapter_id.is_some())
            .collect();
        let mut payloads = Vec::with_capacity(tracks.len());
        for track in &tracks {
            payloads.push(self.store.get(&track.audio_path).await?);
        }
        let master_audio = assembler::assemble_chunks(&payloads, job.output_format)?;
        let master_duration = tracks.iter().map(|t| t.duration_secs).sum::<f64>();
        let master_size = master_audio.len() as u64;
        let extension = job.output_format.extension();

        let mut used = HashSet::new();
        for track in &tracks {
            used.insert(track.export_filename.clone());
        }
        let master_name = assembler::master_filename(total, extension, &mut used);
        let master_path = format!("jobs/{}/tracks/{}", job_id, master_name);
        self.store
            .put(&master_path, master_audio)
            .await?;

        let master_track = Track {
            id: Uuid::new_v4(),
            job_id,
            chapter_id: None,
            track_index: total,
            title: "Complete Audiobook".to_string(),
            segment_type: SegmentType::Bonus,
            duration_secs: master_duration,
            file_size_bytes: master_size,
            export_filename: master_name,
            audio_path: master_path,
            status: TrackStatus::Completed,
        };
        self.repo.add_track(job_id, master_track);

        let chapters_size: u64 = tracks.iter().map(|t| t.file_size_bytes).sum();
        self.repo.modify_job(job_id, |job| {
            job.status = JobStatus::Completed;
            job.progress_percent = 100.0;
            job.total_duration_secs = Some(master_duration);
            job.total_size_bytes = Some(chapters_size + master_size);
            job.completed_at = Some(chrono::Utc::now());
        })?;

        info!("Job {} completed with {} tracks plus master", job_id, total);

        // Кандидаты рекламного фрагмента создаются после завершения
        // всех основных глав
        if let Err(e) = crate::services::sample::generate_samples(
            job_id,
            &self.repo,
            self.store.as_ref(),
            &self.config,
        )
        .await
        {
            warn!("Failed to generate retail samples for job {}: {}", job_id, e);
        }

        if let Some(sender) = &progress {
            let _ = sender.send(ProgressUpdate::Completed).await;
        }
        Ok(())
    }

    /// Озвучить одну главу и собрать ее дорожку
    #[allow(clippy::too_many_arguments)]
    async fn process_chapter(
        self: Arc<Self>,
        job: &Job,
        chapter: Chapter,
        track_rank: usize,
        total: usize,
        max_chars: usize,
        providers: Vec<Arc<dyn TtsProvider>>,
        policy: FallbackPolicy,
        job_semaphore: Arc<Semaphore>,
        used_filenames: Arc<Mutex<HashSet<String>>>,
        completed: Arc<AtomicUsize>,
        cancel: CancellationToken,
        progress: Option<Sender<ProgressUpdate>>,
    ) {
        if cancel.is_cancelled() {
            return;
        }

        let chapter_id = chapter.id;
        let job_id = job.id;

        let result = self
            .clone()
            .synthesize_chapter(
                job,
                &chapter,
                track_rank,
                max_chars,
                providers,
                policy,
                job_semaphore,
                used_filenames,
                cancel.clone(),
            )
            .await;

        match result {
            Ok(()) => {
                // Идемпотентная отметка завершения: прогресс обновляется
                // ровно один раз на главу
                let newly_completed = self
                    .repo
                    .modify_chapter(job_id, chapter_id, |chapter| {
                        if chapter.status == ChapterStatus::Completed {
                            false
                        } else {
                            chapter.status = ChapterStatus::Completed;
                            chapter.error_message = None;
                            true
                        }
                    })
                    .unwrap_or(false);

                if newly_completed {
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    let percent = done as f32 / total as f32 * 100.0;
                    let _ = self.repo.modify_job(job_id, |job| {
                        // Прогресс не убывает
                        if percent > job.progress_percent {
                            job.progress_percent = percent;
                        }
                    });
                    info!(
                        "Chapter '{}' completed ({}/{} chapters)",
                        chapter.title, done, total
                    );
                    if let Some(sender) = &progress {
                        let _ = sender
                            .send(ProgressUpdate::ChapterCompleted {
                                current: done,
                                total,
                            })
                            .await;
                    }
                }
            }
            Err(AppError::Cancelled) => {
                info!("Chapter '{}' synthesis cancelled", chapter.title);
            }
            Err(e) => {
                error!("Chapter '{}' failed: {}", chapter.title, e);
                let message = e.to_string();
                let _ = self.repo.modify_chapter(job_id, chapter_id, |chapter| {
                    chapter.status = ChapterStatus::Failed;
                    chapter.error_message = Some(message.clone());
                });
                if let Some(sender) = &progress {
                    let _ = sender
                        .send(ProgressUpdate::ChapterFailed {
                            title: chapter.title.clone(),
                        })
                        .await;
                }
            }
        }
    }

    /// Синтез кусков главы и сборка дорожки
    #[allow(clippy::too_many_arguments)]
    async fn synthesize_chapter(
        self: Arc<Self>,
        job: &Job,
        chapter: &Chapter,
        track_rank: usize,
        max_chars: usize,
        providers: Vec<Arc<dyn TtsProvider>>,
        policy: FallbackPolicy,
        job_semaphore: Arc<Semaphore>,
        used_filenames: Arc<Mutex<HashSet<String>>>,
        cancel: CancellationToken,
    ) -> AppResult<()> {
        let job_id = job.id;
        self.repo.modify_chapter(job_id, chapter.id, |chapter| {
            chapter.status = ChapterStatus::Processing;
        })?;

        let text_bytes = self.store.get(&chapter.text_path).await?;
        let text = String::from_utf8_lossy(&text_bytes).to_string();

        let voice = job
            .voices
            .first()
            .cloned()
            .unwrap_or_else(|| providers[0].default_voice().to_string());

        let chunks = split_into_chunks(&text, max_chars);
        if chunks.is_empty() {
            return Err(AppError::Validation(format!(
                "chapter '{}' has no synthesizable text",
                chapter.title
            )));
        }
        let chunk_count = chunks.len();

        let mut chunk_tasks = Vec::with_capacity(chunk_count);
        for chunk in chunks {
            let pool = self.clone();
            let providers = providers.clone();
            let policy = policy.clone();
            let voice = voice.clone();
            let cancel = cancel.clone();
            let job_semaphore = job_semaphore.clone();
            let chapter_id = chapter.id;

            let format = job.output_format;
            chunk_tasks.push(tokio::spawn(async move {
                pool.synthesize_chunk(
                    job_id,
                    chapter_id,
                    chunk,
                    voice,
                    format,
                    providers,
                    policy,
                    job_semaphore,
                    cancel,
                )
                .await
            }));
        }

        // Куски собираются строго по индексу исходного разбиения,
        // порядок завершения задач значения не имеет
        let mut ordered: Vec<Option<Bytes>> = vec![None; chunk_count];
        let mut first_error: Option<AppError> = None;

        for result in join_all(chunk_tasks).await {
            match result {
                Ok(Ok((index, audio))) => ordered[index] = Some(audio),
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        first_error = Some(AppError::Other(format!(
                            "chunk task panicked: {}",
                            join_err
                        )));
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let payloads: Vec<Bytes> = ordered
            .into_iter()
            .map(|audio| audio.expect("all chunks succeeded"))
            .collect();

        let track_audio = assembler::assemble_chunks(&payloads, job.output_format)?;
        let duration = assembler::estimate_duration_secs(&track_audio, job.output_format);
        let size = track_audio.len() as u64;
        let extension = job.output_format.extension();

        let export_filename = {
            let mut used = used_filenames.lock().unwrap();
            assembler::export_filename(
                track_rank,
                &chapter.title,
                chapter.segment_type,
                extension,
                &mut used,
            )
        };
        let audio_path = format!("jobs/{}/tracks/{}", job_id, export_filename);
        self.store.put(&audio_path, track_audio).await?;

        let track = Track {
            id: Uuid::new_v4(),
            job_id,
            chapter_id: Some(chapter.id),
            track_index: track_rank,
            title: chapter.title.clone(),
            segment_type: chapter.segment_type,
            duration_secs: duration,
            file_size_bytes: size,
            export_filename,
            audio_path,
            status: TrackStatus::Completed,
        };
        self.repo.add_track(job_id, track);

        Ok(())
    }

    /// Синтез одного куска с кэшем, лимитером и цепочкой провайдеров
    #[allow(clippy::too_many_arguments)]
    async fn synthesize_chunk(
        self: Arc<Self>,
        job_id: Uuid,
        chapter_id: Uuid,
        chunk: TextChunk,
        voice: String,
        format: crate::config::OutputFormat,
        providers: Vec<Arc<dyn TtsProvider>>,
        policy: FallbackPolicy,
        job_semaphore: Arc<Semaphore>,
        cancel: CancellationToken,
    ) -> AppResult<(usize, Bytes)> {
        // Сначала предел задачи, затем глобальный, порядок одинаков во
        // всех задачах
        let _job_permit = job_semaphore
            .acquire_owned()
            .await
            .map_err(|_| AppError::Cancelled)?;
        let _global_permit = self
            .global_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::Cancelled)?;

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        // Кэш: кусок мог быть озвучен в прошлом запуске
        if let Some(cache) = &self.cache {
            for provider in &providers {
                let resolved = crate::services::tts::resolve_voice(provider.as_ref(), &voice);
                if let Some(audio) = cache.get(provider.kind(), &resolved, &chunk.text, format) {
                    return Ok((chunk.index, audio));
                }
            }
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            result = synthesize_with_fallback(
                &chunk.text,
                &voice,
                format,
                &providers,
                &self.rate_limiter,
                &policy,
            ) => result?,
        };

        // Стоимость ключуется куском: повтор перезаписывает запись
        let chunk_key = format!("{}:{}", chapter_id, chunk.index);
        let cost_rate = providers
            .iter()
            .find(|p| p.kind() == outcome.provider)
            .map(|p| p.cost_per_1000_chars())
            .unwrap_or(0.0);
        self.cost_tracker.record(
            job_id,
            outcome.provider,
            chunk_key,
            outcome.characters_billed,
            cost_rate,
        );

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(
                outcome.provider,
                &outcome.voice,
                &chunk.text,
                format,
                &outcome.audio,
            ) {
                warn!("Failed to cache synthesized chunk: {}", e);
            }
        }

        Ok((chunk.index, outcome.audio))
    }
}
