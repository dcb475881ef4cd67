//! Учет стоимости синтеза
//!
//! Журнал расходов по задачам и провайдерам. Записи ключуются тройкой
//! (задача, провайдер, кусок текста): повторный синтез куска заменяет
//! свою запись, а не добавляет новую, поэтому повторы не задваивают
//! стоимость.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use uuid::Uuid;

use crate::config::ProviderKind;

/// Одна запись журнала
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub provider: ProviderKind,
    pub characters: usize,
    pub cost_usd: f64,
}

/// Сводка расходов задачи
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobCost {
    pub total_usd: f64,
    pub total_characters: usize,
    pub by_provider: HashMap<String, f64>,
}

type LedgerKey = (Uuid, ProviderKind, String);

/// Журнал стоимости, общий для всех задач процесса
#[derive(Default)]
pub struct CostTracker {
    ledger: Mutex<HashMap<LedgerKey, LedgerEntry>>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Записать стоимость синтеза куска
    ///
    /// Запись с тем же ключом перезаписывается: кусок, синтезированный
    /// повторно, оплачивается один раз.
    pub fn record(
        &self,
        job_id: Uuid,
        provider: ProviderKind,
        chunk_key: impl Into<String>,
        characters: usize,
        cost_per_1000_chars: f64,
    ) {
        let cost_usd = characters as f64 * cost_per_1000_chars / 1000.0;
        let entry = LedgerEntry {
            provider,
            characters,
            cost_usd,
        };
        let mut ledger = self.ledger.lock().unwrap();
        ledger.insert((job_id, provider, chunk_key.into()), entry);
    }

    /// Текущая суммарная стоимость задачи
    pub fn job_total(&self, job_id: Uuid) -> f64 {
        let ledger = self.ledger.lock().unwrap();
        ledger
            .iter()
            .filter(|((job, _, _), _)| *job == job_id)
            .map(|(_, entry)| entry.cost_usd)
            .sum()
    }

    /// Сводка расходов задачи по провайдерам
    pub fn job_cost(&self, job_id: Uuid) -> JobCost {
        let ledger = self.ledger.lock().unwrap();
        let mut summary = JobCost::default();
        for ((job, provider, _), entry) in ledger.iter() {
            if *job != job_id {
                continue;
            }
            summary.total_usd += entry.cost_usd;
            summary.total_characters += entry.characters;
            *summary
                .by_provider
                .entry(provider.to_string())
                .or_insert(0.0) += entry.cost_usd;
        }
        summary
    }

    /// Удалить записи задачи (вызывается при удалении задачи)
    pub fn remove_job(&self, job_id: Uuid) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.retain(|(job, _, _), _| *job != job_id);
    }
}
