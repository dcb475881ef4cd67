//! Выбор рекламного фрагмента
//!
//! Из завершенных основных глав извлекаются фрагменты-кандидаты,
//! каждый оценивается по вовлеченности, эмоциональной насыщенности и
//! риску спойлера. Итоговая оценка складывается с настраиваемыми
//! весами, кандидаты отдаются по убыванию оценки.

use once_cell::sync::Lazy;
use rayon::prelude::*;
use uuid::Uuid;

use crate::config::{AppConfig, SampleWeights};
use crate::errors::{AppError, AppResult};
use crate::models::{Chapter, RetailSample};
use crate::services::text::{count_words, split_sentences};
use crate::storage::{JobRepository, ObjectStore};

/// Не больше стольких кандидатов с одной главы
const MAX_CANDIDATES_PER_CHAPTER: usize = 3;

/// Слова с выраженной эмоциональной окраской
static EMOTION_WORDS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "love", "hate", "fear", "terror", "joy", "grief", "rage", "fury", "despair", "hope",
        "panic", "dread", "ecstasy", "anguish", "longing", "horror", "delight", "sorrow",
        "trembled", "wept", "screamed", "gasped", "shuddered", "heartbroken", "desperate",
        "furious", "terrified", "overjoyed", "devastated",
    ]
});

/// Глаголы действия, оживляющие сцену
static VIVID_VERBS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "ran", "leapt", "grabbed", "slammed", "whispered", "shouted", "lunged", "froze",
        "crashed", "bolted", "snatched", "hurled", "staggered", "darted", "burst", "sprinted",
        "clutched", "spun", "flung", "dove",
    ]
});

/// Усилители эмоциональной окраски
static INTENSIFIERS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "suddenly", "never", "always", "completely", "utterly", "absolutely", "desperately",
        "violently", "instantly",
    ]
});

/// Маркеры развязки сюжета, повышающие риск спойлера
static RESOLUTION_MARKERS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "finally",
        "at last",
        "revealed",
        "confessed",
        "the truth was",
        "it was over",
        "all along",
        "turned out",
        "in the end",
        "the killer was",
        "had been dead",
    ]
});

/// Оценки одного фрагмента
#[derive(Debug, Clone, Copy)]
pub struct ExcerptScores {
    pub engagement: f32,
    pub intensity: f32,
    pub spoiler_risk: f32,
    pub overall: f32,
}

/// Оценить фрагмент текста
///
/// position_fraction - положение исходной главы среди основных глав
/// (0.0 начало книги, 1.0 конец), оно дает линейную часть штрафа за
/// спойлер.
pub fn score_excerpt(text: &str, position_fraction: f32, weights: &SampleWeights) -> ExcerptScores {
    let engagement = engagement_score(text);
    let intensity = intensity_score(text);
    let spoiler_risk = spoiler_risk_score(text, position_fraction);

    let overall = (engagement * weights.engagement_weight
        + intensity * weights.intensity_weight
        + (1.0 - spoiler_risk) * weights.spoiler_weight)
        .clamp(0.0, 1.0);

    ExcerptScores {
        engagement,
        intensity,
        spoiler_risk,
        overall,
    }
}

/// Вовлеченность: диалоги, вопросы и восклицания, живые глаголы,
/// разнообразие длины предложений
fn engagement_score(text: &str) -> f32 {
    let words = count_words(text).max(1) as f32;
    let lowered = text.to_lowercase();

    let sentences = split_sentences(text);
    let sentence_count = sentences.len().max(1) as f32;

    // Доля предложений с прямой речью
    let dialogue = sentences
        .iter()
        .filter(|s| s.contains('"') || s.contains('\u{201c}') || s.contains('\u{201d}'))
        .count() as f32
        / sentence_count;

    // Доля вопросов и восклицаний
    let punchy = sentences
        .iter()
        .filter(|s| s.ends_with('?') || s.ends_with('!'))
        .count() as f32
        / sentence_count;

    // Живые глаголы на сотню слов
    let vivid_hits = VIVID_VERBS
        .iter()
        .filter(|v| lowered.contains(*v))
        .count() as f32;
    let vivid = (vivid_hits / words * 100.0 / 5.0).min(1.0);

    // Разброс длины предложений
    let lengths: Vec<f32> = sentences.iter().map(|s| count_words(s) as f32).collect();
    let mean = lengths.iter().sum::<f32>() / sentence_count;
    let variance = lengths.iter().map(|l| (l - mean).powi(2)).sum::<f32>() / sentence_count;
    let variety = (variance.sqrt() / 10.0).min(1.0);

    (dialogue * 0.35 + punchy * 0.2 + vivid * 0.25 + variety * 0.2).clamp(0.0, 1.0)
}

/// Эмоциональная насыщенность: плотность эмоциональной лексики
fn intensity_score(text: &str) -> f32 {
    let words = count_words(text).max(1) as f32;
    let lowered = text.to_lowercase();

    let emotion_hits = EMOTION_WORDS
        .iter()
        .filter(|w| lowered.contains(*w))
        .count() as f32;
    let intensifier_hits = INTENSIFIERS
        .iter()
        .filter(|w| lowered.contains(*w))
        .count() as f32;

    ((emotion_hits * 1.5 + intensifier_hits) / words * 100.0 / 6.0).clamp(0.0, 1.0)
}

/// Риск спойлера: положение главы в книге плюс маркеры развязки
fn spoiler_risk_score(text: &str, position_fraction: f32) -> f32 {
    let lowered = text.to_lowercase();
    let marker_hits = RESOLUTION_MARKERS
        .iter()
        .filter(|m| lowered.contains(*m))
        .count() as f32;

    let positional = position_fraction.clamp(0.0, 1.0) * 0.6;
    let markers = (marker_hits / 3.0).min(1.0) * 0.4;

    (positional + markers).clamp(0.0, 1.0)
}

/// Извлечь фрагменты-кандидаты из текста главы
///
/// Окна выравниваются по абзацам и не пересекаются; окно, перебравшее
/// максимум при добирании до минимума, обрезается по словам.
pub fn extract_candidates(text: &str, min_words: usize, max_words: usize) -> Vec<String> {
    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();

    let mut windows = Vec::new();
    let mut start = 0;

    while start < paragraphs.len() && windows.len() < MAX_CANDIDATES_PER_CHAPTER {
        let mut words = 0;
        let mut end = start;
        let mut parts: Vec<&str> = Vec::new();

        while end < paragraphs.len() && words < min_words {
            parts.push(paragraphs[end]);
            words += count_words(paragraphs[end]);
            end += 1;
        }

        if words >= min_words {
            let mut window = parts.join("\n\n");
            if words > max_words {
                window = truncate_words(&window, max_words);
            }
            windows.push(window);
        }

        if end == start {
            break;
        }
        start = end;
    }

    windows
}

/// Обрезать текст до max_words слов
fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Сформировать кандидатов для задачи по завершенным основным главам
///
/// Ранее созданные неподтвержденные кандидаты отбрасываются, финальный
/// фрагмент (если есть) сохраняется. Возвращает количество новых
/// кандидатов.
pub async fn generate_samples(
    job_id: Uuid,
    repo: &JobRepository,
    store: &dyn ObjectStore,
    config: &AppConfig,
) -> AppResult<usize> {
    let chapters = repo.get_chapters(job_id)?;
    let body_chapters: Vec<&Chapter> = chapters
        .iter()
        .filter(|c| c.is_included_body() && c.status == crate::models::ChapterStatus::Completed)
        .collect();

    if body_chapters.is_empty() {
        return Err(AppError::Validation(
            "retail samples require at least one completed body chapter".to_string(),
        ));
    }

    // Читаем тексты глав из хранилища
    let mut chapter_texts: Vec<(Uuid, f32, String)> = Vec::new();
    let body_count = body_chapters.len();
    for (position, chapter) in body_chapters.iter().enumerate() {
        let bytes = store.get(&chapter.text_path).await?;
        let text = String::from_utf8_lossy(&bytes).to_string();
        let position_fraction = if body_count > 1 {
            position as f32 / (body_count - 1) as f32
        } else {
            0.0
        };
        chapter_texts.push((chapter.id, position_fraction, text));
    }

    // Извлекаем окна-кандидаты
    let mut raw_candidates: Vec<(Uuid, f32, String)> = Vec::new();
    for (chapter_id, position_fraction, text) in &chapter_texts {
        for window in extract_candidates(text, config.sample_min_words, config.sample_max_words) {
            raw_candidates.push((*chapter_id, *position_fraction, window));
        }
    }

    // Короткая книга: ни одно окно не добрало минимум, берем первую
    // главу целиком
    if raw_candidates.is_empty() {
        let (chapter_id, position_fraction, text) = &chapter_texts[0];
        raw_candidates.push((
            *chapter_id,
            *position_fraction,
            truncate_words(text, config.sample_max_words),
        ));
    }

    let weights = config.sample_weights;

    // Оценка кандидатов параллельно
    let scored: Vec<RetailSample> = raw_candidates
        .into_par_iter()
        .map(|(chapter_id, position_fraction, text)| {
            let scores = score_excerpt(&text, position_fraction, &weights);
            let word_count = count_words(&text);
            RetailSample {
                id: Uuid::new_v4(),
                job_id,
                chapter_id,
                text,
                edited_text: None,
                word_count,
                engagement_score: scores.engagement,
                emotional_intensity_score: scores.intensity,
                spoiler_risk_score: scores.spoiler_risk,
                overall_score: scores.overall,
                is_auto_suggested: true,
                is_user_confirmed: false,
                is_final: false,
            }
        })
        .collect();

    let created = scored.len();
    log::info!("Generated {} retail sample candidates for job {}", created, job_id);

    repo.modify_samples(job_id, |samples| {
        samples.retain(|s| s.is_final);
        samples.extend(scored);
    })?;

    Ok(created)
}

/// Подтвердить кандидата как финальный фрагмент
///
/// Финальным становится ровно один фрагмент: флаг снимается с ранее
/// подтвержденного.
pub fn confirm_sample(
    repo: &JobRepository,
    job_id: Uuid,
    sample_id: Uuid,
) -> AppResult<RetailSample> {
    repo.modify_samples(job_id, |samples| {
        if !samples.iter().any(|s| s.id == sample_id) {
            return Err(AppError::NotFound(format!("retail sample {}", sample_id)));
        }
        let mut confirmed = None;
        for sample in samples.iter_mut() {
            if sample.id == sample_id {
                sample.is_final = true;
                sample.is_user_confirmed = true;
                confirmed = Some(sample.clone());
            } else {
                sample.is_final = false;
            }
        }
        Ok(confirmed.expect("sample existence checked above"))
    })?
}
