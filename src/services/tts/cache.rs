//! Модуль для кэширования результатов синтеза
//!
//! Кусок текста, уже озвученный данным голосом данного провайдера,
//! при повторе берется из кэша без обращения к провайдеру и без оплаты.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use bytes::Bytes;
use log::{debug, warn};
use md5;

use crate::config::{AppConfig, OutputFormat, ProviderKind};
use crate::errors::AppResult;

/// Кэш результатов синтеза на диске
pub struct SynthesisCache {
    /// Директория для кэша
    cache_dir: PathBuf,
    /// Максимальный размер кэша в байтах
    max_size: Option<u64>,
    /// Карта для отслеживания кэшированных файлов
    cache_map: Mutex<HashMap<String, PathBuf>>,
}

impl SynthesisCache {
    /// Создать кэш по настройкам приложения
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let cache_dir = if let Some(dir) = &config.cache_dir {
            PathBuf::from(dir)
        } else {
            std::env::temp_dir().join("audionova-cache")
        };

        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)?;
        }

        Ok(Self {
            cache_dir,
            max_size: config.max_cache_size,
            cache_map: Mutex::new(HashMap::new()),
        })
    }

    /// Достать аудио из кэша
    pub fn get(
        &self,
        provider: ProviderKind,
        voice: &str,
        text: &str,
        format: OutputFormat,
    ) -> Option<Bytes> {
        let key = cache_key(provider, voice, text, format);
        let path = {
            let map = self.cache_map.lock().unwrap();
            map.get(&key).cloned()
        }?;

        match fs::read(&path) {
            Ok(bytes) => {
                debug!("Synthesis cache hit for key {}", key);
                Some(Bytes::from(bytes))
            }
            Err(e) => {
                warn!("Failed to read cached audio {}: {}", path.display(), e);
                let mut map = self.cache_map.lock().unwrap();
                map.remove(&key);
                None
            }
        }
    }

    /// Положить аудио в кэш
    pub fn put(
        &self,
        provider: ProviderKind,
        voice: &str,
        text: &str,
        format: OutputFormat,
        audio: &Bytes,
    ) -> AppResult<()> {
        let key = cache_key(provider, voice, text, format);
        let cache_file = self.cache_dir.join(format!("{}.bin", key));

        fs::write(&cache_file, audio)?;

        {
            let mut map = self.cache_map.lock().unwrap();
            map.insert(key, cache_file);
        }

        self.check_cache_size()?;
        Ok(())
    }

    /// Очистить кэш
    pub fn clear(&self) -> AppResult<()> {
        for file in fs::read_dir(&self.cache_dir)? {
            let file = file?;
            if file.file_type()?.is_file() {
                fs::remove_file(file.path())?;
            }
        }
        self.cache_map.lock().unwrap().clear();
        Ok(())
    }

    /// Проверить размер кэша и удалить старые файлы при переполнении
    fn check_cache_size(&self) -> AppResult<()> {
        let max_size = match self.max_size {
            Some(max_size) => max_size,
            None => return Ok(()),
        };

        let mut total_size = 0;
        let mut files = Vec::new();

        for entry in fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let metadata = entry.metadata()?;
                total_size += metadata.len();
                files.push((entry.path(), metadata.modified()?));
            }
        }

        if total_size > max_size {
            // Удаляем от старых к новым, пока не уложимся в предел
            files.sort_by(|a, b| a.1.cmp(&b.1));
            for (path, _) in files {
                if total_size <= max_size {
                    break;
                }
                if let Ok(metadata) = fs::metadata(&path) {
                    total_size -= metadata.len();
                    fs::remove_file(path)?;
                }
            }
        }

        Ok(())
    }
}

/// Ключ кэша: md5 от провайдера, голоса, формата и текста
fn cache_key(provider: ProviderKind, voice: &str, text: &str, format: OutputFormat) -> String {
    let mut hasher = md5::Context::new();
    hasher.consume(provider.as_str().as_bytes());
    hasher.consume(voice.as_bytes());
    hasher.consume(format.extension().as_bytes());
    hasher.consume(text.as_bytes());
    format!("{:x}", hasher.compute())
}
