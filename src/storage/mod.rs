//! Хранилище объектов
//!
//! Рукописи и аудио живут во внешнем хранилище объектов и адресуются
//! путем. Все записи цельные, частичной записи и дозаписи нет.

use std::collections::HashMap;
use std::path::PathBuf;

use bytes::Bytes;
use log::debug;
use tokio::sync::RwLock;

use crate::errors::{AppError, AppResult};

pub mod repository;

pub use repository::JobRepository;

/// Интерфейс хранилища объектов
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Прочитать объект целиком
    async fn get(&self, path: &str) -> AppResult<Bytes>;

    /// Записать объект целиком
    async fn put(&self, path: &str, data: Bytes) -> AppResult<()>;

    /// Удалить объект
    async fn delete(&self, path: &str) -> AppResult<()>;
}

/// Хранилище объектов в локальной файловой системе
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> AppResult<PathBuf> {
        if path.contains("..") {
            return Err(AppError::Storage(format!(
                "Object path must not contain '..': {}",
                path
            )));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait::async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, path: &str) -> AppResult<Bytes> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("object {}", path)))
            }
            Err(e) => Err(AppError::Storage(format!(
                "failed to read {}: {}",
                path, e
            ))),
        }
    }

    async fn put(&self, path: &str, data: Bytes) -> AppResult<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("failed to create {}: {}", path, e)))?;
        }
        tokio::fs::write(&full, &data)
            .await
            .map_err(|e| AppError::Storage(format!("failed to write {}: {}", path, e)))?;
        debug!("Stored object {} ({} bytes)", path, data.len());
        Ok(())
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!(
                "failed to delete {}: {}",
                path, e
            ))),
        }
    }
}

/// Хранилище объектов в памяти (для тестов)
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Bytes>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Количество хранимых объектов
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, path: &str) -> AppResult<Bytes> {
        let objects = self.objects.read().await;
        objects
            .get(path)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("object {}", path)))
    }

    async fn put(&self, path: &str, data: Bytes) -> AppResult<()> {
        let mut objects = self.objects.write().await;
        objects.insert(path.to_string(), data);
        Ok(())
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        let mut objects = self.objects.write().await;
        objects.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        store
            .put("jobs/abc/manuscript.txt", Bytes::from_static(b"text"))
            .await
            .unwrap();
        let data = store.get("jobs/abc/manuscript.txt").await.unwrap();
        assert_eq!(data, Bytes::from_static(b"text"));

        store.delete("jobs/abc/manuscript.txt").await.unwrap();
        assert!(matches!(
            store.get("jobs/abc/manuscript.txt").await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn local_store_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(store.get("../outside").await.is_err());
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryObjectStore::new();
        store.put("a/b", Bytes::from_static(b"1")).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), Bytes::from_static(b"1"));
        assert_eq!(store.len().await, 1);
        store.delete("a/b").await.unwrap();
        assert!(store.is_empty().await);
    }
}
