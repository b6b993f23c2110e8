//! Persistence collaborator boundary.
//!
//! The store writes entities one at a time. Each record is flat: a page record does not carry
//! its widgets, a dashboard record does not carry its pages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::PersistenceError;
use crate::model::{DashboardId, GlobalFilter, PageId, Widget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Dashboard,
    Page,
    Widget,
    GlobalFilter,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn widget(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Widget, id)
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} {}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardRecord {
    pub id: DashboardId,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub id: PageId,
    pub dashboard_id: DashboardId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetRecord {
    pub page_id: PageId,
    pub widget: Widget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalFilterRecord {
    pub dashboard_id: DashboardId,
    pub filter: GlobalFilter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "camelCase")]
pub enum Record {
    Dashboard(DashboardRecord),
    Page(PageRecord),
    Widget(WidgetRecord),
    GlobalFilter(GlobalFilterRecord),
}

impl Record {
    pub fn key(&self) -> EntityKey {
        match self {
            Record::Dashboard(d) => EntityKey::new(EntityKind::Dashboard, d.id.clone()),
            Record::Page(p) => EntityKey::new(EntityKind::Page, p.id.clone()),
            Record::Widget(w) => EntityKey::new(EntityKind::Widget, w.widget.id.clone()),
            Record::GlobalFilter(g) => EntityKey::new(EntityKind::GlobalFilter, g.filter.id.clone()),
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Record::Dashboard(d) => d.updated_at,
            Record::Page(p) => p.updated_at,
            Record::Widget(w) => w.widget.updated_at,
            Record::GlobalFilter(g) => g.filter.updated_at,
        }
    }

    fn set_identity(&mut self, id: String, updated_at: DateTime<Utc>) {
        match self {
            Record::Dashboard(d) => {
                d.id = id;
                d.updated_at = updated_at;
            }
            Record::Page(p) => {
                p.id = id;
                p.updated_at = updated_at;
            }
            Record::Widget(w) => {
                w.widget.id = id;
                w.widget.updated_at = updated_at;
            }
            Record::GlobalFilter(g) => {
                g.filter.id = id;
                g.filter.updated_at = updated_at;
            }
        }
    }
}

/// Remote store of dashboard entities. Create returns the authoritative record with its
/// server-assigned id and timestamp.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn create(&self, record: Record) -> Result<Record, PersistenceError>;

    async fn update(&self, record: Record) -> Result<Record, PersistenceError>;

    async fn delete(&self, key: &EntityKey) -> Result<(), PersistenceError>;
}

/// Persistence held in process memory. Assigns `srv-N` ids and stamps every write with the
/// current time.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    records: Mutex<HashMap<EntityKey, Record>>,
    next_id: AtomicU64,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &EntityKey) -> Option<Record> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn create(&self, mut record: Record) -> Result<Record, PersistenceError> {
        let id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        record.set_identity(id, Utc::now());
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.key(), record.clone());
        Ok(record)
    }

    async fn update(&self, mut record: Record) -> Result<Record, PersistenceError> {
        let key = record.key();
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if !records.contains_key(&key) {
            return Err(PersistenceError::NotFound(key.to_string()));
        }
        record.set_identity(key.id.clone(), Utc::now());
        records.insert(key, record.clone());
        Ok(record)
    }

    async fn delete(&self, key: &EntityKey) -> Result<(), PersistenceError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| PersistenceError::NotFound(key.to_string()))
    }
}
