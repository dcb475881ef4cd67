//! Хранилище записей задач
//!
//! Держит записи Job/Chapter/Track/RetailSample, ключуемые
//! идентификатором задачи. Поля порядка глав и дорожек являются
//! единственным источником истины о порядке, отдельного манифеста нет.

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::{Chapter, Job, RetailSample, Track};

#[derive(Default)]
struct JobRecord {
    job: Option<Job>,
    chapters: Vec<Chapter>,
    tracks: Vec<Track>,
    samples: Vec<RetailSample>,
}

/// Репозиторий записей, принадлежащих задачам
#[derive(Default)]
pub struct JobRepository {
    records: RwLock<HashMap<Uuid, JobRecord>>,
}

impl JobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Сохранить новую задачу
    pub fn insert_job(&self, job: Job) {
        let mut records = self.records.write().unwrap();
        let record = records.entry(job.id).or_default();
        record.job = Some(job);
    }

    /// Прочитать задачу
    pub fn get_job(&self, job_id: Uuid) -> AppResult<Job> {
        let records = self.records.read().unwrap();
        records
            .get(&job_id)
            .and_then(|r| r.job.clone())
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))
    }

    /// Изменить задачу под блокировкой
    pub fn modify_job<R>(&self, job_id: Uuid, f: impl FnOnce(&mut Job) -> R) -> AppResult<R> {
        let mut records = self.records.write().unwrap();
        let record = records
            .get_mut(&job_id)
            .and_then(|r| r.job.as_mut())
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;
        Ok(f(record))
    }

    /// Заменить главы задачи
    pub fn set_chapters(&self, job_id: Uuid, chapters: Vec<Chapter>) {
        let mut records = self.records.write().unwrap();
        let record = records.entry(job_id).or_default();
        record.chapters = chapters;
    }

    /// Главы задачи в текущем порядке
    pub fn get_chapters(&self, job_id: Uuid) -> AppResult<Vec<Chapter>> {
        let records = self.records.read().unwrap();
        let record = records
            .get(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;
        let mut chapters = record.chapters.clone();
        chapters.sort_by_key(|c| c.current_order);
        Ok(chapters)
    }

    /// Одна глава
    pub fn get_chapter(&self, job_id: Uuid, chapter_id: Uuid) -> AppResult<Chapter> {
        let records = self.records.read().unwrap();
        records
            .get(&job_id)
            .and_then(|r| r.chapters.iter().find(|c| c.id == chapter_id))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("chapter {}", chapter_id)))
    }

    /// Изменить набор глав под блокировкой
    pub fn modify_chapters<R>(
        &self,
        job_id: Uuid,
        f: impl FnOnce(&mut Vec<Chapter>) -> R,
    ) -> AppResult<R> {
        let mut records = self.records.write().unwrap();
        let record = records
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;
        Ok(f(&mut record.chapters))
    }

    /// Изменить одну главу под блокировкой
    pub fn modify_chapter<R>(
        &self,
        job_id: Uuid,
        chapter_id: Uuid,
        f: impl FnOnce(&mut Chapter) -> R,
    ) -> AppResult<R> {
        let mut records = self.records.write().unwrap();
        let chapter = records
            .get_mut(&job_id)
            .and_then(|r| r.chapters.iter_mut().find(|c| c.id == chapter_id))
            .ok_or_else(|| AppError::NotFound(format!("chapter {}", chapter_id)))?;
        Ok(f(chapter))
    }

    /// Добавить дорожку
    pub fn add_track(&self, job_id: Uuid, track: Track) {
        let mut records = self.records.write().unwrap();
        let record = records.entry(job_id).or_default();
        record.tracks.push(track);
    }

    /// Дорожки задачи в порядке воспроизведения
    pub fn get_tracks(&self, job_id: Uuid) -> AppResult<Vec<Track>> {
        let records = self.records.read().unwrap();
        let record = records
            .get(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;
        let mut tracks = record.tracks.clone();
        tracks.sort_by_key(|t| t.track_index);
        Ok(tracks)
    }

    /// Изменить набор дорожек под блокировкой
    pub fn modify_tracks<R>(
        &self,
        job_id: Uuid,
        f: impl FnOnce(&mut Vec<Track>) -> R,
    ) -> AppResult<R> {
        let mut records = self.records.write().unwrap();
        let record = records
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;
        Ok(f(&mut record.tracks))
    }

    /// Кандидаты рекламного фрагмента, лучшие первыми
    pub fn get_samples(&self, job_id: Uuid) -> AppResult<Vec<RetailSample>> {
        let records = self.records.read().unwrap();
        let record = records
            .get(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;
        let mut samples = record.samples.clone();
        samples.sort_by(|a, b| {
            b.overall_score
                .partial_cmp(&a.overall_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(samples)
    }

    /// Изменить набор кандидатов под блокировкой
    pub fn modify_samples<R>(
        &self,
        job_id: Uuid,
        f: impl FnOnce(&mut Vec<RetailSample>) -> R,
    ) -> AppResult<R> {
        let mut records = self.records.write().unwrap();
        let record = records
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;
        Ok(f(&mut record.samples))
    }

    /// Удалить задачу со всеми принадлежащими ей записями
    pub fn delete_job(&self, job_id: Uuid) {
        let mut records = self.records.write().unwrap();
        records.remove(&job_id);
    }
}
