//! Лимитер запросов к провайдерам
//!
//! По одному ведру токенов на провайдера, общему для всех одновременных
//! запросов синтеза всех задач. Вместимость и скорость пополнения берутся
//! из заявленного провайдером предела запросов в минуту; переопределение
//! из конфигурации не может его превышать.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::{AppConfig, ProviderKind};
use crate::errors::{AppError, AppResult};

struct Bucket {
    semaphore: Arc<Semaphore>,
    refill_handle: JoinHandle<()>,
}

impl Bucket {
    /// Создать ведро с заданной вместимостью и интервалом пополнения.
    /// Очередь ожидающих у семафора tokio честная (FIFO), поэтому токены
    /// выдаются в порядке обращения.
    fn new(capacity: usize, refill_interval: Duration) -> Self {
        let semaphore = Arc::new(Semaphore::new(capacity));
        let refill_semaphore = semaphore.clone();

        let refill_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refill_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Первый тик срабатывает сразу, пропускаем его
            ticker.tick().await;
            loop {
                ticker.tick().await;
                // Не даем ведру переполниться выше вместимости
                if refill_semaphore.available_permits() < capacity {
                    refill_semaphore.add_permits(1);
                }
            }
        });

        Self {
            semaphore,
            refill_handle,
        }
    }
}

impl Drop for Bucket {
    fn drop(&mut self) {
        self.refill_handle.abort();
    }
}

/// Лимитер запросов с ведром токенов на провайдера
///
/// Создается один раз при старте процесса и передается сервисам как
/// Arc-зависимость. Должен создаваться внутри tokio-рантайма: пополнение
/// ведер работает на фоновых задачах.
pub struct RateLimiter {
    buckets: HashMap<ProviderKind, Bucket>,
}

impl RateLimiter {
    /// Создать лимитер по явным пределам запросов в минуту
    pub fn new(limits: &[(ProviderKind, u32)]) -> Self {
        let mut buckets = HashMap::new();
        for (kind, rpm) in limits {
            let rpm = (*rpm).max(1);
            let capacity = rpm as usize;
            let refill_interval = Duration::from_secs_f64(60.0 / rpm as f64);
            debug!(
                "Rate bucket for {}: capacity {}, refill every {:?}",
                kind, capacity, refill_interval
            );
            buckets.insert(*kind, Bucket::new(capacity, refill_interval));
        }
        Self { buckets }
    }

    /// Создать лимитер для всех поддерживаемых провайдеров с учетом
    /// переопределений из конфигурации (обрезаются до заявленного
    /// провайдером максимума)
    pub fn from_config(config: &AppConfig) -> Self {
        let limits: Vec<(ProviderKind, u32)> = ProviderKind::all()
            .iter()
            .map(|kind| {
                let declared = super::declared_rpm(*kind);
                let configured = config.providers.get(*kind).requests_per_minute_override;
                let effective = match configured {
                    Some(requested) if requested > declared => {
                        warn!(
                            "Requested {} rpm for {} exceeds the declared ceiling {}, clamping",
                            requested, kind, declared
                        );
                        declared
                    }
                    Some(requested) => requested,
                    None => declared,
                };
                (*kind, effective)
            })
            .collect();
        Self::new(&limits)
    }

    /// Получить токен на один запрос к провайдеру
    ///
    /// Блокирует вызывающего до появления токена либо до истечения
    /// timeout, в этом случае возвращает RateLimitTimeout (повторяемая
    /// ошибка, цепочка отказоустойчивости может перейти к следующему
    /// провайдеру).
    pub async fn acquire(&self, kind: ProviderKind, timeout: Duration) -> AppResult<()> {
        let bucket = self.buckets.get(&kind).ok_or_else(|| {
            AppError::Configuration(format!("No rate bucket for provider {}", kind))
        })?;

        match tokio::time::timeout(timeout, bucket.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => {
                // Токен потрачен, обратно не возвращается
                permit.forget();
                Ok(())
            }
            Ok(Err(_)) => Err(AppError::Other(format!(
                "Rate bucket for {} is closed",
                kind
            ))),
            Err(_) => Err(AppError::RateLimitTimeout {
                provider: kind.to_string(),
            }),
        }
    }

    /// Сколько токенов сейчас доступно (для диагностики и тестов)
    pub fn available(&self, kind: ProviderKind) -> Option<usize> {
        self.buckets
            .get(&kind)
            .map(|bucket| bucket.semaphore.available_permits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn capacity_is_never_exceeded() {
        // Ведро на 3 токена с медленным пополнением
        let limits = [(ProviderKind::OpenAi, 3u32)];
        let limiter = RateLimiter::new(&limits);

        for _ in 0..3 {
            limiter
                .acquire(ProviderKind::OpenAi, Duration::from_millis(10))
                .await
                .unwrap();
        }

        // Четвертый запрос не проходит до пополнения
        let err = limiter
            .acquire(ProviderKind::OpenAi, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RateLimitTimeout { .. }));
    }

    #[tokio::test]
    async fn tokens_refill_over_time() {
        // 600 запросов в минуту дают пополнение каждые 100 мс
        let limits = [(ProviderKind::ElevenLabs, 600u32)];
        let limiter = RateLimiter::new(&limits);

        // Выбираем все токены
        while limiter.available(ProviderKind::ElevenLabs).unwrap() > 0 {
            limiter
                .acquire(ProviderKind::ElevenLabs, Duration::from_millis(5))
                .await
                .unwrap();
        }

        // После пополнения токен снова доступен
        limiter
            .acquire(ProviderKind::ElevenLabs, Duration::from_millis(500))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn override_is_clamped_to_declared_ceiling() {
        let mut config = AppConfig::default();
        config.providers.openai.requests_per_minute_override = Some(100_000);
        let limiter = RateLimiter::from_config(&config);
        // Ведро не больше заявленного предела провайдера
        assert_eq!(
            limiter.available(ProviderKind::OpenAi).unwrap(),
            super::super::declared_rpm(ProviderKind::OpenAi) as usize
        );
    }

    #[tokio::test]
    async fn unknown_provider_is_an_error() {
        let limiter = RateLimiter::new(&[(ProviderKind::OpenAi, 10)]);
        let err = limiter
            .acquire(ProviderKind::Azure, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[tokio::test]
    async fn concurrent_contention_respects_capacity() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let limits = [(ProviderKind::Azure, 5u32)];
        let limiter = Arc::new(RateLimiter::new(&limits));
        let admitted = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            let admitted = admitted.clone();
            tasks.push(tokio::spawn(async move {
                if limiter
                    .acquire(ProviderKind::Azure, Duration::from_millis(40))
                    .await
                    .is_ok()
                {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // За окно таймаута пополнение не успевает, проходят только
        // стартовые 5 токенов
        assert_eq!(admitted.load(Ordering::SeqCst), 5);
    }
}
