//! Модуль подготовки текста
//!
//! Очищает сырой текст рукописи и нарезает его на куски, пригодные для
//! отправки провайдеру синтеза речи.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HTML_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref BLANK_RUN: Regex = Regex::new(r"\n{3,}").unwrap();
    static ref LINE_SPACES: Regex = Regex::new(r"[ \t]+").unwrap();
    // Конец предложения: точка/вопрос/восклицание, возможно закрывающая
    // кавычка или скобка, затем пробельный символ
    static ref SENTENCE_END: Regex = Regex::new(r#"[.!?…]["'»”’)]*\s"#).unwrap();
}

/// Кусок текста для одного запроса синтеза
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// Позиция куска в исходном порядке разбиения
    pub index: usize,
    /// Текст куска
    pub text: String,
}

impl TextChunk {
    /// Количество символов в куске
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Очистка сырого текста рукописи
///
/// Удаляет BOM и управляющие символы, HTML-теги, декодирует частые
/// HTML-сущности, нормализует переводы строк и пробелы. Границы абзацев
/// (пустые строки) сохраняются, они нужны сегментации и выбору
/// рекламного фрагмента.
pub fn clean_text(raw: &str) -> String {
    let text = raw.trim_start_matches('\u{feff}').replace("\r\n", "\n");

    // Убираем управляющие символы, кроме перевода строки
    let text: String = text
        .chars()
        .filter(|c| *c == '\n' || !c.is_control())
        .collect();

    let text = HTML_TAG.replace_all(&text, "");

    // Заменяем специальные символы
    let text = text
        .to_string()
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&apos;", "'");

    // Нормализуем пробелы внутри строк и схлопываем длинные пустые блоки
    let text = LINE_SPACES.replace_all(&text, " ");
    let text = text
        .lines()
        .map(|line| line.trim())
        .collect::<Vec<&str>>()
        .join("\n");
    let text = BLANK_RUN.replace_all(&text, "\n\n");

    text.trim().to_string()
}

/// Нормализация текста куска перед отправкой провайдеру
///
/// Провайдерам абзацная структура не нужна, пробельные символы
/// схлопываются в одиночные пробелы.
pub fn normalize_for_synthesis(text: &str) -> String {
    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Разбить текст на предложения
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for m in SENTENCE_END.find_iter(text) {
        let sentence = text[start..m.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = m.end();
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    sentences
}

/// Нарезать текст на куски не длиннее max_chars символов
///
/// Разрезы предпочитают границы предложений, чтобы в аудио не было
/// склеек посреди фразы. Предложение длиннее max_chars делится по
/// словам, отдельное слово длиннее max_chars режется жестко.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<TextChunk> {
    assert!(max_chars > 0, "max_chars must be positive");

    let normalized = normalize_for_synthesis(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for sentence in split_sentences(&normalized) {
        let sentence_chars = sentence.chars().count();

        if sentence_chars > max_chars {
            // Предложение не помещается целиком, закрываем текущий кусок
            // и режем предложение по словам
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            pieces.extend(split_oversized(&sentence, max_chars));
            continue;
        }

        let extra = if current.is_empty() {
            sentence_chars
        } else {
            sentence_chars + 1
        };

        if current_chars + extra > max_chars {
            pieces.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        if current.is_empty() {
            current_chars = sentence_chars;
            current = sentence;
        } else {
            current.push(' ');
            current.push_str(&sentence);
            current_chars += sentence_chars + 1;
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextChunk { index, text })
        .collect()
}

/// Разрезать слишком длинное предложение по словам, при необходимости
/// жестко по символам
fn split_oversized(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for word in sentence.split_whitespace() {
        let word_chars = word.chars().count();

        if word_chars > max_chars {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            pieces.extend(hard_split(word, max_chars));
            continue;
        }

        let extra = if current.is_empty() {
            word_chars
        } else {
            word_chars + 1
        };

        if current_chars + extra > max_chars {
            pieces.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        if current.is_empty() {
            current_chars = word_chars;
            current = word.to_string();
        } else {
            current.push(' ');
            current.push_str(word);
            current_chars += word_chars + 1;
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
}

/// Жесткое разрезание строки на части по max_chars символов
fn hard_split(word: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max_chars)
        .map(|part| part.iter().collect())
        .collect()
}

/// Подсчет слов в тексте
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_strips_html_and_entities() {
        let raw = "<p>Hello&nbsp;world</p>\r\n\r\n\r\n\r\nSecond&amp;third";
        let cleaned = clean_text(raw);
        assert_eq!(cleaned, "Hello world\n\nSecond&third");
    }

    #[test]
    fn clean_preserves_paragraph_breaks() {
        let raw = "First paragraph.\n\nSecond   paragraph.";
        let cleaned = clean_text(raw);
        assert_eq!(cleaned, "First paragraph.\n\nSecond paragraph.");
    }

    #[test]
    fn split_sentences_basic() {
        let text = "One. Two! Three? Four";
        let sentences = split_sentences(text);
        assert_eq!(sentences, vec!["One.", "Two!", "Three?", "Four"]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_into_chunks("", 100).is_empty());
        assert!(split_into_chunks("   \n\n  ", 100).is_empty());
    }

    #[test]
    fn short_text_single_chunk() {
        let chunks = split_into_chunks("Just one sentence.", 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Just one sentence.");
    }

    #[test]
    fn chunks_respect_sentence_boundaries() {
        let text = "First sentence here. Second sentence here. Third sentence here.";
        let chunks = split_into_chunks(text, 45);
        // Ни один кусок не рвет предложение посередине
        for chunk in &chunks {
            assert!(chunk.char_count() <= 45);
            assert!(chunk.text.ends_with('.'));
        }
        let rejoined = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(rejoined, text);
    }

    #[test]
    fn oversized_sentence_splits_on_words() {
        let text = "word ".repeat(50);
        let chunks = split_into_chunks(text.trim(), 30);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.char_count() <= 30);
            assert!(!chunk.text.starts_with(' '));
        }
    }

    #[test]
    fn giant_word_hard_split() {
        let word = "a".repeat(95);
        let chunks = split_into_chunks(&word, 30);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].char_count(), 30);
        assert_eq!(chunks[3].char_count(), 5);
    }

    #[test]
    fn chunk_indices_are_sequential() {
        let text = "One sentence. ".repeat(20);
        let chunks = split_into_chunks(&text, 40);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn word_counting() {
        assert_eq!(count_words("the quick brown fox"), 4);
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("  spaced   out  "), 2);
    }
}
