#![allow(dead_code)]

use media_reconcile::domain::model::{MediaRow, MediaTarget, MediaValue};
use media_reconcile::domain::ports::MediaRepository;
use media_reconcile::{ReconcileError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

/// 以 (table, column) 分開存放的記憶體資料表
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<BTreeMap<String, BTreeMap<String, MediaValue>>>,
    pub updates: Mutex<Vec<(String, String, MediaValue)>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, target: &MediaTarget, id: &str, value: MediaValue) {
        self.tables
            .lock()
            .unwrap()
            .entry(target.name())
            .or_default()
            .insert(id.to_string(), value);
    }

    pub fn value(&self, target: &MediaTarget, id: &str) -> Option<MediaValue> {
        self.tables
            .lock()
            .unwrap()
            .get(&target.name())
            .and_then(|rows| rows.get(id).cloned())
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl MediaRepository for MemoryRepository {
    async fn fetch_page(
        &self,
        target: &MediaTarget,
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MediaRow>> {
        let tables = self.tables.lock().unwrap();
        let rows = tables
            .get(&target.name())
            .ok_or_else(|| ReconcileError::processing(format!("relation {} does not exist", target.table)))?;
        Ok(rows
            .iter()
            .filter(|(id, _)| after_id.map_or(true, |after| id.as_str() > after))
            .take(limit)
            .map(|(id, value)| MediaRow {
                id: id.clone(),
                value: value.clone(),
            })
            .collect())
    }

    async fn update(&self, target: &MediaTarget, row_id: &str, value: &MediaValue) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let slot = tables
            .get_mut(&target.name())
            .and_then(|rows| rows.get_mut(row_id))
            .ok_or_else(|| ReconcileError::processing(format!("row {} not found", row_id)))?;
        *slot = value.clone();
        self.updates
            .lock()
            .unwrap()
            .push((target.name(), row_id.to_string(), value.clone()));
        Ok(())
    }
}

pub fn touch(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

pub fn list(values: &[&str]) -> MediaValue {
    MediaValue::List(values.iter().map(|s| s.to_string()).collect())
}
