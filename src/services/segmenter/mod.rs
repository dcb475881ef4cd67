//! Модуль сегментации рукописи
//!
//! Разбивает очищенный текст на упорядоченные структурные единицы
//! (главы) с типом сегмента, количеством слов и оценкой длительности.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::SegmentType;
use crate::services::text::count_words;

lazy_static! {
    // "Chapter 12", "CHAPTER ONE", "Part IV", "Глава 3"
    static ref CHAPTER_HEADING: Regex = Regex::new(
        r"(?i)^(chapter|part|глава|часть)\s+([0-9]+|[ivxlcdm]+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|twenty)\b.{0,60}$"
    )
    .unwrap();
    // Строка из одного номера: "7", "12.", "XIV"
    static ref BARE_NUMBER: Regex = Regex::new(r"^([0-9]{1,4}|[IVXLCDM]{1,7})\.?$").unwrap();
}

/// Маркеры вводных материалов
const FRONT_MATTER_MARKERS: &[&str] = &[
    "dedication",
    "copyright",
    "preface",
    "prologue",
    "foreword",
    "introduction",
    "a note to the reader",
];

/// Маркеры заключительных материалов
const BACK_MATTER_MARKERS: &[&str] = &[
    "epilogue",
    "afterword",
    "acknowledgments",
    "acknowledgements",
    "about the author",
    "appendix",
    "glossary",
    "also by",
];

/// Маркеры титров
const CREDITS_MARKERS: &[&str] = &["credits", "opening credits", "closing credits"];

/// Результат сегментации: одна глава с текстом
#[derive(Debug, Clone)]
pub struct SegmentedChapter {
    pub source_order: usize,
    pub title: String,
    pub text: String,
    pub segment_type: SegmentType,
    pub word_count: usize,
    pub estimated_duration_secs: f64,
}

/// Распознанный заголовок
#[derive(Debug)]
struct Heading {
    line_index: usize,
    title: String,
    segment_type: SegmentType,
}

/// Разбить рукопись на главы
///
/// Нулевое количество распознанных границ дает ровно одну основную
/// главу на весь текст, пустой список глав не возвращается никогда.
pub fn segment_manuscript(text: &str, narration_rate_wpm: u32) -> Vec<SegmentedChapter> {
    let lines: Vec<&str> = text.lines().collect();
    let headings = detect_headings(&lines);

    log::debug!("Detected {} structural boundaries", headings.len());

    let mut chapters = Vec::new();

    if headings.is_empty() {
        // Границы не найдены, вся рукопись становится одной главой
        let body = text.trim();
        if !body.is_empty() {
            chapters.push(build_chapter(
                0,
                "Chapter 1".to_string(),
                body.to_string(),
                SegmentType::BodyChapter,
                narration_rate_wpm,
            ));
        }
        return ensure_non_empty(chapters, text, narration_rate_wpm);
    }

    let mut order = 0;

    // Текст до первого заголовка
    let preamble = lines[..headings[0].line_index].join("\n");
    let preamble = preamble.trim();
    if !preamble.is_empty() {
        let preamble_words = count_words(preamble);
        // Короткое вступление без заголовка считаем вводным материалом,
        // длинное - основным текстом
        let segment_type = if preamble_words < 200 {
            SegmentType::FrontMatter
        } else {
            SegmentType::BodyChapter
        };
        let title = match segment_type {
            SegmentType::FrontMatter => "Front Matter".to_string(),
            _ => "Chapter 1".to_string(),
        };
        chapters.push(build_chapter(
            order,
            title,
            preamble.to_string(),
            segment_type,
            narration_rate_wpm,
        ));
        order += 1;
    }

    for (i, heading) in headings.iter().enumerate() {
        let body_start = heading.line_index + 1;
        let body_end = headings
            .get(i + 1)
            .map(|next| next.line_index)
            .unwrap_or(lines.len());
        let body = lines[body_start..body_end].join("\n");
        let body = body.trim();

        if body.is_empty() {
            // Заголовок без текста (например, шмуцтитул части) пропускаем
            continue;
        }

        chapters.push(build_chapter(
            order,
            heading.title.clone(),
            body.to_string(),
            heading.segment_type,
            narration_rate_wpm,
        ));
        order += 1;
    }

    ensure_non_empty(chapters, text, narration_rate_wpm)
}

fn ensure_non_empty(
    chapters: Vec<SegmentedChapter>,
    text: &str,
    narration_rate_wpm: u32,
) -> Vec<SegmentedChapter> {
    if !chapters.is_empty() {
        return chapters;
    }
    vec![build_chapter(
        0,
        "Chapter 1".to_string(),
        text.trim().to_string(),
        SegmentType::BodyChapter,
        narration_rate_wpm,
    )]
}

fn build_chapter(
    source_order: usize,
    title: String,
    text: String,
    segment_type: SegmentType,
    narration_rate_wpm: u32,
) -> SegmentedChapter {
    let word_count = count_words(&text);
    SegmentedChapter {
        source_order,
        title,
        text,
        segment_type,
        word_count,
        estimated_duration_secs: estimate_duration_secs(word_count, narration_rate_wpm),
    }
}

/// Оценка длительности начитки: слова / темп
pub fn estimate_duration_secs(word_count: usize, narration_rate_wpm: u32) -> f64 {
    if narration_rate_wpm == 0 {
        return 0.0;
    }
    word_count as f64 / narration_rate_wpm as f64 * 60.0
}

/// Найти строки-заголовки и определить их тип сегмента
fn detect_headings(lines: &[&str]) -> Vec<Heading> {
    let mut headings = Vec::new();

    for (line_index, raw_line) in lines.iter().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(segment_type) = classify_marker(line) {
            headings.push(Heading {
                line_index,
                title: normalize_title(line),
                segment_type,
            });
            continue;
        }

        if CHAPTER_HEADING.is_match(line) {
            headings.push(Heading {
                line_index,
                title: normalize_title(line),
                segment_type: SegmentType::BodyChapter,
            });
            continue;
        }

        if BARE_NUMBER.is_match(line) {
            let number = line.trim_end_matches('.');
            headings.push(Heading {
                line_index,
                title: format!("Chapter {}", number),
                segment_type: SegmentType::BodyChapter,
            });
            continue;
        }

        // Короткая строка заглавными буквами тоже считается заголовком.
        // Неоднозначные случаи относим к основным главам.
        if is_short_all_caps(line) {
            headings.push(Heading {
                line_index,
                title: normalize_title(line),
                segment_type: SegmentType::BodyChapter,
            });
        }
    }

    headings
}

/// Сопоставить строку с маркерами вводных/заключительных материалов
fn classify_marker(line: &str) -> Option<SegmentType> {
    let lowered = line.to_lowercase();
    let lowered = lowered.trim_end_matches(':').trim();

    if CREDITS_MARKERS.iter().any(|m| lowered == *m) {
        return Some(if lowered.starts_with("closing") {
            SegmentType::ClosingCredits
        } else {
            SegmentType::OpeningCredits
        });
    }

    if FRONT_MATTER_MARKERS
        .iter()
        .any(|m| lowered == *m || lowered.starts_with(&format!("{} ", m)))
    {
        return Some(SegmentType::FrontMatter);
    }

    if BACK_MATTER_MARKERS
        .iter()
        .any(|m| lowered == *m || lowered.starts_with(&format!("{} ", m)))
    {
        return Some(SegmentType::BackMatter);
    }

    None
}

/// Короткая строка, набранная целиком заглавными буквами
fn is_short_all_caps(line: &str) -> bool {
    let words = count_words(line);
    if words == 0 || words > 6 || line.len() < 2 {
        return false;
    }
    let has_letters = line.chars().any(|c| c.is_alphabetic());
    has_letters
        && line
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(|c| c.is_uppercase())
}

/// Привести заголовок к виду названия главы
fn normalize_title(line: &str) -> String {
    let trimmed = line.trim().trim_end_matches(':');
    if trimmed.chars().filter(|c| c.is_alphabetic()).count() > 0
        && trimmed
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(|c| c.is_uppercase())
    {
        // ИЗ ЗАГЛАВНЫХ делаем обычный регистр с большой буквы в словах
        return trimmed
            .split_whitespace()
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => {
                        first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                    }
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ");
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 150;

    #[test]
    fn no_boundaries_yields_single_body_chapter() {
        let text = "Just a plain story without any headings. It flows on and on.";
        let chapters = segment_manuscript(text, RATE);
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].segment_type, SegmentType::BodyChapter);
        assert_eq!(chapters[0].title, "Chapter 1");
        assert_eq!(chapters[0].source_order, 0);
    }

    #[test]
    fn three_part_manuscript() {
        let text = "Preface\n\nThis book took years to write.\n\nChapter 1\n\nIt was a dark and stormy night. The rain fell in torrents.\n\nAbout the Author\n\nThe author lives in the mountains.";
        let chapters = segment_manuscript(text, RATE);
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].segment_type, SegmentType::FrontMatter);
        assert_eq!(chapters[1].segment_type, SegmentType::BodyChapter);
        assert_eq!(chapters[2].segment_type, SegmentType::BackMatter);
        let body_count = chapters
            .iter()
            .filter(|c| c.segment_type == SegmentType::BodyChapter)
            .count();
        assert_eq!(body_count, 1);
    }

    #[test]
    fn numbered_and_caps_headings() {
        let text =
            "CHAPTER ONE\n\nFirst chapter text here.\n\n2\n\nSecond chapter text here.\n\nTHE LONG ROAD\n\nThird chapter text here.";
        let chapters = segment_manuscript(text, RATE);
        assert_eq!(chapters.len(), 3);
        assert!(chapters
            .iter()
            .all(|c| c.segment_type == SegmentType::BodyChapter));
        assert_eq!(chapters[1].title, "Chapter 2");
        assert_eq!(chapters[2].title, "The Long Road");
    }

    #[test]
    fn source_order_is_sequential() {
        let text = "Prologue\n\nBefore it began.\n\nChapter 1\n\nThe beginning.\n\nChapter 2\n\nThe middle.\n\nEpilogue\n\nAfter it ended.";
        let chapters = segment_manuscript(text, RATE);
        assert_eq!(chapters.len(), 4);
        for (i, chapter) in chapters.iter().enumerate() {
            assert_eq!(chapter.source_order, i);
        }
    }

    #[test]
    fn duration_estimate_uses_narration_rate() {
        // 300 слов при 150 словах в минуту дают две минуты
        assert_eq!(estimate_duration_secs(300, 150), 120.0);
        assert_eq!(estimate_duration_secs(0, 150), 0.0);
        assert_eq!(estimate_duration_secs(100, 0), 0.0);
    }

    #[test]
    fn heading_without_body_is_skipped() {
        let text = "Part One\n\nChapter 1\n\nActual text of the chapter.";
        let chapters = segment_manuscript(text, RATE);
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "Chapter 1");
    }

    #[test]
    fn word_counts_populated() {
        let text = "Chapter 1\n\none two three four five";
        let chapters = segment_manuscript(text, RATE);
        assert_eq!(chapters[0].word_count, 5);
    }
}
