//! Сборка аудио
//!
//! Склеивает озвученные куски главы в одну дорожку в порядке исходного
//! разбиения, а готовые дорожки - в сводную дорожку всей книги. Также
//! генерирует экспортные имена файлов, пригодные для дистрибуции.

use std::collections::HashSet;
use std::io::Cursor;

use bytes::{Bytes, BytesMut};
use hound::{WavReader, WavSpec, WavWriter};
use lazy_static::lazy_static;
use regex::Regex;

use crate::config::OutputFormat;
use crate::errors::{AppError, AppResult};
use crate::models::SegmentType;

lazy_static! {
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

/// Максимальная длина основы имени файла
const MAX_TITLE_LEN: usize = 40;

/// Склеить куски аудио в одну дорожку
///
/// Куски должны идти в порядке исходного разбиения текста. Для MP3
/// склейка побайтовая (потоки одного кодека корректно конкатенируются),
/// для WAV куски разбираются и пишутся заново с проверкой совпадения
/// параметров.
pub fn assemble_chunks(chunks: &[Bytes], format: OutputFormat) -> AppResult<Bytes> {
    if chunks.is_empty() {
        return Err(AppError::AudioProcessing(
            "no audio chunks to assemble".to_string(),
        ));
    }
    match format {
        OutputFormat::Mp3 { .. } => Ok(concat_mp3(chunks)),
        OutputFormat::Wav => concat_wav(chunks),
    }
}

/// Побайтовая конкатенация MP3-потоков
fn concat_mp3(chunks: &[Bytes]) -> Bytes {
    let total: usize = chunks.iter().map(|c| c.len()).sum();
    let mut out = BytesMut::with_capacity(total);
    for chunk in chunks {
        out.extend_from_slice(chunk);
    }
    out.freeze()
}

/// Склейка WAV-кусков с проверкой совпадения параметров
fn concat_wav(chunks: &[Bytes]) -> AppResult<Bytes> {
    let mut spec: Option<WavSpec> = None;
    let mut samples: Vec<i16> = Vec::new();

    for (i, chunk) in chunks.iter().enumerate() {
        let mut reader = WavReader::new(Cursor::new(chunk.as_ref()))
            .map_err(|e| AppError::AudioProcessing(format!("bad wav chunk {}: {}", i, e)))?;

        let chunk_spec = reader.spec();
        match spec {
            None => spec = Some(chunk_spec),
            Some(expected) if expected != chunk_spec => {
                return Err(AppError::AudioProcessing(format!(
                    "wav chunk {} spec mismatch: {:?} vs {:?}",
                    i, chunk_spec, expected
                )));
            }
            Some(_) => {}
        }

        for sample in reader.samples::<i16>() {
            samples.push(sample.map_err(|e| {
                AppError::AudioProcessing(format!("bad sample in wav chunk {}: {}", i, e))
            })?);
        }
    }

    let spec = spec.expect("at least one chunk");
    let mut out = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut out, spec)
            .map_err(|e| AppError::AudioProcessing(format!("failed to start wav: {}", e)))?;
        for sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| AppError::AudioProcessing(format!("failed to write wav: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| AppError::AudioProcessing(format!("failed to finalize wav: {}", e)))?;
    }

    Ok(Bytes::from(out.into_inner()))
}

/// Оценка длительности дорожки в секундах
pub fn estimate_duration_secs(audio: &Bytes, format: OutputFormat) -> f64 {
    match format {
        OutputFormat::Mp3 { bitrate_kbps } => {
            if bitrate_kbps == 0 {
                return 0.0;
            }
            audio.len() as f64 * 8.0 / (bitrate_kbps as f64 * 1000.0)
        }
        OutputFormat::Wav => match WavReader::new(Cursor::new(audio.as_ref())) {
            Ok(reader) => {
                let spec = reader.spec();
                reader.duration() as f64 / spec.sample_rate as f64
            }
            Err(_) => 0.0,
        },
    }
}

/// Привести название главы к безопасной основе имени файла
pub fn sanitize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let cleaned = NON_ALNUM.replace_all(&lowered, "_");
    let cleaned = cleaned.trim_matches('_');
    let truncated: String = cleaned.chars().take(MAX_TITLE_LEN).collect();
    let truncated = truncated.trim_matches('_').to_string();
    if truncated.is_empty() {
        "untitled".to_string()
    } else {
        truncated
    }
}

/// Собрать экспортное имя файла дорожки
///
/// Схема: двузначный номер, очищенное название, суффикс типа сегмента.
/// Имена уникальны в рамках задачи: при совпадении добавляется числовой
/// суффикс.
pub fn export_filename(
    index: usize,
    title: &str,
    segment_type: SegmentType,
    extension: &str,
    used: &mut HashSet<String>,
) -> String {
    let base = format!(
        "{:02}_{}_{}",
        index,
        sanitize_title(title),
        segment_type.filename_suffix()
    );

    let mut candidate = format!("{}.{}", base, extension);
    let mut n = 2;
    while used.contains(&candidate) {
        candidate = format!("{}_{}.{}", base, n, extension);
        n += 1;
    }
    used.insert(candidate.clone());
    candidate
}

/// Имя сводной дорожки всей книги
pub fn master_filename(track_count: usize, extension: &str, used: &mut HashSet<String>) -> String {
    let base = format!("{:02}_complete_audiobook", track_count);
    let mut candidate = format!("{}.{}", base, extension);
    let mut n = 2;
    while used.contains(&candidate) {
        candidate = format!("{}_{}.{}", base, n, extension);
        n += 1;
    }
    used.insert(candidate.clone());
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_chunk(samples: &[i16]) -> Bytes {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut out = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut out, spec).unwrap();
            for s in samples {
                writer.write_sample(*s).unwrap();
            }
            writer.finalize().unwrap();
        }
        Bytes::from(out.into_inner())
    }

    #[test]
    fn mp3_concat_preserves_order() {
        let chunks = vec![
            Bytes::from_static(b"AAA"),
            Bytes::from_static(b"BBB"),
            Bytes::from_static(b"CCC"),
        ];
        let format = OutputFormat::Mp3 { bitrate_kbps: 128 };
        let out = assemble_chunks(&chunks, format).unwrap();
        assert_eq!(out, Bytes::from_static(b"AAABBBCCC"));
    }

    #[test]
    fn wav_concat_joins_samples() {
        let a = wav_chunk(&[1, 2, 3]);
        let b = wav_chunk(&[4, 5]);
        let out = assemble_chunks(&[a, b], OutputFormat::Wav).unwrap();

        let reader = WavReader::new(Cursor::new(out.as_ref())).unwrap();
        assert_eq!(reader.duration(), 5);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn wav_spec_mismatch_is_an_error() {
        let a = wav_chunk(&[1, 2, 3]);
        let spec = WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut out = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut out, spec).unwrap();
            writer.write_sample(1i16).unwrap();
            writer.write_sample(1i16).unwrap();
            writer.finalize().unwrap();
        }
        let b = Bytes::from(out.into_inner());

        assert!(assemble_chunks(&[a, b], OutputFormat::Wav).is_err());
    }

    #[test]
    fn empty_chunk_list_rejected() {
        let format = OutputFormat::Mp3 { bitrate_kbps: 128 };
        assert!(assemble_chunks(&[], format).is_err());
    }

    #[test]
    fn mp3_duration_estimate() {
        let audio = Bytes::from(vec![0u8; 16000]);
        let format = OutputFormat::Mp3 { bitrate_kbps: 128 };
        let secs = estimate_duration_secs(&audio, format);
        assert!((secs - 1.0).abs() < 1e-9);
    }

    #[test]
    fn titles_are_sanitized() {
        assert_eq!(
            sanitize_title("Chapter 1: The Beginning!"),
            "chapter_1_the_beginning"
        );
        assert_eq!(sanitize_title("???"), "untitled");
        let long = "word ".repeat(30);
        assert!(sanitize_title(&long).chars().count() <= MAX_TITLE_LEN);
    }

    #[test]
    fn filenames_unique_within_job() {
        let mut used = HashSet::new();
        let first = export_filename(0, "Intro", SegmentType::FrontMatter, "mp3", &mut used);
        let second = export_filename(0, "Intro", SegmentType::FrontMatter, "mp3", &mut used);
        assert_eq!(first, "00_intro_front_matter.mp3");
        assert_eq!(second, "00_intro_front_matter_2.mp3");
        assert_ne!(first, second);
    }

    #[test]
    fn filename_scheme() {
        let mut used = HashSet::new();
        let name = export_filename(3, "The Long Road", SegmentType::BodyChapter, "mp3", &mut used);
        assert_eq!(name, "03_the_long_road_chapter.mp3");
    }
}
